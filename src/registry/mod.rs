//! Registry module - Service records, the registry store and discovery queries

pub mod discovery;
pub mod store;
pub mod types;

pub use discovery::{
    DiscoveredService, HealthyInstance, RoutingInfo, ServiceDiagnostics, StatusCounts,
    TrafficTotals,
};
pub use store::{ServiceRegistry, StatusChange};
pub use types::{
    ServiceRecord, ServiceRegistration, ServiceStatus, ServiceSummary, ServiceUpdate,
};
