pub mod client;
pub mod error;
pub mod exec;
pub mod token;

pub use client::{HostawayClient, ReviewFeed, ReviewsPage};
pub use error::HostawayError;
pub use exec::{HttpExec, ReqwestExecutor};
pub use token::{Clock, Credentials, SystemClock, TokenCache};
