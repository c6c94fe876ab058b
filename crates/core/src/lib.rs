pub mod alert;
pub mod config;
pub mod error;
pub mod ids;
pub mod json;
pub mod metrics;

pub use alert::*;
pub use config::Config;
pub use error::*;
pub use ids::*;
pub use metrics::*;
