pub mod policy;
pub mod store;

pub use policy::{GuardConfig, HealthConfig, MaintenanceConfig, RetryConfig};
pub use store::{sidecar, StoreConfig, SynchronousMode, DAILY_BACKUP_FILE};
