//! Gateway module - Heartbeat monitoring and request dispatch

pub mod dispatcher;
pub mod health_monitor;

pub use dispatcher::{DispatchConfig, Dispatcher, HealthProbe, ProxyResponse};
pub use health_monitor::{HealthMonitor, MonitorConfig, TickReport};
