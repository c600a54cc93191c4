pub mod aggregate;
pub mod allocine;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod orchestrator;
pub mod pacing;
pub mod store;
pub mod week;

pub use error::{Error, Result};

/// Browser user agent sent with every outgoing request
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/143.0.0.0 Safari/537.36";

/// HTTP client shared by the showtime source and the catalog.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().cookie_store(true).build()?)
}
