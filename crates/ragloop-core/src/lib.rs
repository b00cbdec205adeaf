pub mod config;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{RagError, Result};
pub use types::*;
