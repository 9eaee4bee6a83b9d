// Cardiolink - Heart rate variability over a gated health store and a companion wearable

pub mod companion;
pub mod config;
pub mod error;
pub mod health;
pub mod hrv;
pub mod monitor;
pub mod stream;
pub mod types;

pub use companion::CompanionChannel;
pub use config::CardiolinkConfig;
pub use health::HealthGateway;
pub use monitor::HealthMonitor;
pub use stream::EventStream;
pub use types::heartrate::{HeartRateSample, HrvMetrics, RrInterval};
pub use types::result::OperationResult;
