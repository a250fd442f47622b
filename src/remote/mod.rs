//! External collaborators: object storage, image fetching and the hosted
//! generation service. The core only sees the traits defined here; the
//! `reqwest` implementations live in the submodules.

pub mod fetch;
pub mod replicate;
pub mod storage;
#[cfg(test)]
mod test_server;

use reqwest::blocking::Client;
use std::time::Duration;

use crate::canvas::{PixelGrid, SelectionMask};
use crate::error::VisError;
use crate::io::{decode_mask, decode_rgba};

pub use fetch::HttpImageFetcher;
pub use replicate::ReplicateService;
pub use storage::HttpImageStore;

/// Object storage: bytes in, publicly readable URL out.
pub trait ImageStore: Send + Sync {
    fn upload_image(&self, bytes: &[u8], content_type: &str) -> Result<String, VisError>;
}

/// Downloads images referenced by URL.
pub trait ImageFetcher: Send + Sync {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, VisError>;

    fn fetch_image(&self, url: &str) -> Result<PixelGrid, VisError> {
        decode_rgba(&self.fetch_bytes(url)?)
    }

    /// Fetch a mask image; luma above 128 is selected.
    fn fetch_mask(&self, url: &str) -> Result<SelectionMask, VisError> {
        decode_mask(&self.fetch_bytes(url)?)
    }
}

/// Blocking HTTP client shared by all collaborators of one process.
pub fn http_client(timeout: Duration) -> Result<Client, VisError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("slabviz/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VisError::Config(format!("HTTP client: {}", e)))
}

/// Trim a response body for log and error messages.
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}
