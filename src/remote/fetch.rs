use reqwest::blocking::Client;
use std::thread;
use std::time::Duration;

use super::{truncate_text, ImageFetcher};
use crate::error::VisError;
use crate::log_warn;

/// GET-based image download. Transport errors and 5xx responses are retried
/// (GETs are idempotent); 4xx responses are not.
pub struct HttpImageFetcher {
    http: Client,
    retries: u32,
    backoff: Duration,
}

impl HttpImageFetcher {
    pub fn new(http: Client, retries: u32) -> Self {
        Self {
            http,
            retries,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn fetch_once(&self, url: &str) -> Result<Vec<u8>, (bool, VisError)> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| (true, VisError::Fetch(format!("{}: {}", url, e))))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let err = VisError::Fetch(format!(
                "{} returned {}: {}",
                url,
                status,
                truncate_text(&body, 256)
            ));
            return Err((status.is_server_error(), err));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| (true, VisError::Fetch(format!("{}: {}", url, e))))
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, VisError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url) {
                Ok(bytes) => return Ok(bytes),
                Err((retryable, err)) => {
                    if !retryable || attempt >= self.retries {
                        return Err(err);
                    }
                    attempt += 1;
                    log_warn!("Fetch retry {}/{}: {}", attempt, self.retries, err);
                    thread::sleep(self.backoff * attempt);
                }
            }
        }
    }
}
