pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{Config, OverlayConfig, PurgeConfig, RevertConfig, RevertStrategyKind, RunConfig, SchedulerConfig, ServerConfig};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
