pub mod config;
pub mod error;
pub mod fetch;
pub mod process;
pub mod schema;

pub use error::{AcsError, Result};
