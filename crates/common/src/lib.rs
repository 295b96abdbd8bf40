pub mod config;
pub mod errors;
pub mod logging;
pub mod text;

pub use crate::config::AppConfig;
pub use crate::errors::{Classified, ErrorKind};
