pub mod config;
pub mod error;
pub mod identity;
pub mod model;

pub use config::Config;
pub use error::KairosError;
pub use model::*;
