//! S3 URL Handler Library
//!
//! Fetches and publishes dependency-resolver artifacts stored in S3.
//!
//! # Features
//!
//! - **URL Normalisation**: Virtual-hosted, path-style and custom-domain URLs
//! - **Credential Chain**: 16 layered credential sources, role assumption first
//! - **Region Discovery**: URL text, reverse DNS, then the bucket location API
//! - **Resolver Contract**: `stat`, `open`, `list`, `fetch` and `put`
//!
//! # Example
//!
//! ```no_run
//! use s3_url_handler::{config::Config, handler::S3UrlHandler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("s3-url-handler.yaml")?;
//!     let handler = S3UrlHandler::from_config(&config);
//!     let info = handler.stat("s3://my-bucket.s3.amazonaws.com/releases/app-1.0.jar").await?;
//!     println!("available: {}", info.available);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod env;
pub mod handler;
pub mod metrics;
pub mod region;
pub mod s3;
pub mod uri;

// Re-export commonly used types
pub use config::Config;
pub use handler::{HandlerError, S3UrlHandler, UrlInfo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
