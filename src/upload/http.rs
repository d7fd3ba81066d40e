use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::{Endpoint, UploadBatch, UploadError, Uploader};
use crate::config::UploadConfig;

/// Posts batches to the backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    data_url: String,
    static_url: String,
}

impl HttpUploader {
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()?;
        let base = config.base_url.trim_end_matches('/');

        Ok(HttpUploader {
            client,
            data_url: format!("{}{}", base, config.data_path),
            static_url: format!("{}{}", base, config.static_path),
        })
    }

    pub fn url_for(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Data => &self.data_url,
            Endpoint::Static => &self.static_url,
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn send(&self, batch: &UploadBatch) -> Result<(), UploadError> {
        let body = batch.encode()?;
        let url = self.url_for(batch.endpoint);
        tracing::debug!(url, payload = %String::from_utf8_lossy(&body), "Data to be sent");

        let response = self.client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), response = %text, "Upload response");

        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_join_base_and_paths() {
        let config = UploadConfig {
            base_url: "http://10.0.0.5:8000/".to_string(),
            ..UploadConfig::default()
        };
        let uploader = HttpUploader::new(&config).unwrap();
        assert_eq!(uploader.url_for(Endpoint::Data), "http://10.0.0.5:8000/api/data");
        assert_eq!(uploader.url_for(Endpoint::Static), "http://10.0.0.5:8000/api/static");
    }
}
