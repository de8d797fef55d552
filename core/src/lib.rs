pub mod backoff;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use transport::Transport;
