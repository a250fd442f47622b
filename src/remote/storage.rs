use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use uuid::Uuid;

use super::{truncate_text, ImageStore};
use crate::error::VisError;
use crate::io::{JPEG_CONTENT_TYPE, PNG_CONTENT_TYPE};
use crate::log_info;
use crate::settings::Settings;

/// Upload to a public bucket of a Supabase-style storage API:
///
///   POST {base}/storage/v1/object/{bucket}/{path}
///   public URL: {base}/storage/v1/object/public/{bucket}/{path}
pub struct HttpImageStore {
    base_url: String,
    bucket: String,
    key: String,
    prefix: String,
    http: Client,
}

impl HttpImageStore {
    pub fn new(base_url: &str, bucket: &str, key: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            bucket: bucket.trim().trim_matches('/').to_string(),
            key: key.trim().to_string(),
            prefix: "public".to_string(),
            http,
        }
    }

    pub fn from_settings(settings: &Settings, http: Client) -> Result<Self, VisError> {
        if settings.storage_url.is_empty() {
            return Err(VisError::Config("storage_url is not configured".to_string()));
        }
        Ok(Self::new(
            &settings.storage_url,
            &settings.storage_bucket,
            &settings.storage_key,
            http,
        ))
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_matches('/').to_string();
        self
    }

    /// Fresh object path, e.g. `public/6f1c…e2.jpg`.
    fn object_path(&self, content_type: &str) -> String {
        let name = format!("{}.{}", Uuid::new_v4(), extension_for(content_type));
        if self.prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    pub fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }
}

impl ImageStore for HttpImageStore {
    fn upload_image(&self, bytes: &[u8], content_type: &str) -> Result<String, VisError> {
        let path = self.object_path(content_type);
        let endpoint = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        );
        let mut request = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        if !self.key.is_empty() {
            request = request
                .header(AUTHORIZATION, format!("Bearer {}", self.key))
                .header("apikey", self.key.as_str());
        }
        let response = request
            .send()
            .map_err(|e| VisError::Upload(format!("{}: {}", endpoint, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VisError::Upload(format!(
                "{} returned {}: {}",
                endpoint,
                status,
                truncate_text(&body, 256)
            )));
        }
        let url = self.public_url(&path);
        log_info!("Uploaded {} bytes -> {}", bytes.len(), url);
        Ok(url)
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        JPEG_CONTENT_TYPE => "jpg",
        PNG_CONTENT_TYPE => "png",
        "image/webp" => "webp",
        _ => "bin",
    }
}
