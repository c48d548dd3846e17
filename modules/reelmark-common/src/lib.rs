pub mod config;
pub mod error;
pub mod rules;
pub mod types;

pub use config::Config;
pub use error::ReelmarkError;
pub use rules::*;
pub use types::*;
