pub mod config;
pub mod error;
pub mod textgen;
pub mod types;

pub use config::AppConfig;
pub use error::{OutreachError, OutreachResult};
