//! Configuration module

pub mod settings;

pub use settings::{
    CredentialsConfig, GatewayConfig, LoggingConfig, RegistryConfig, ServerConfig, Settings,
};
