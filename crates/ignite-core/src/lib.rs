pub mod config;
pub mod content;
pub mod db;
pub mod draft;
pub mod error;
pub mod io;
pub mod paths;
pub mod progress;
pub mod publish;
pub mod types;

pub use error::{IgniteError, Result};
