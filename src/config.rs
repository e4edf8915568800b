use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    pub processor_base_url: String,
    pub processor_service_key: String,
    pub software_vendor_key: String,
    pub webhook_secret: String,
    pub batch_dir: String,
    pub jobs_hour: u32,
    pub processor_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            processor_base_url: std::env::var("PROCESSOR_BASE_URL")
                .unwrap_or_else(|_| "https://ws.processor.example/batch".to_string()),
            processor_service_key: std::env::var("PROCESSOR_SERVICE_KEY")
                .unwrap_or_else(|_| "test-service-key".to_string()),
            software_vendor_key: std::env::var("SOFTWARE_VENDOR_KEY")
                .unwrap_or_else(|_| "test-vendor-key".to_string()),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "test-webhook-secret".to_string()),
            batch_dir: std::env::var("BATCH_DIR").unwrap_or_else(|_| "./batches".to_string()),
            jobs_hour: std::env::var("JOBS_HOUR")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or(2),
            processor_timeout_secs: std::env::var("PROCESSOR_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(30),
        })
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor_timeout_secs)
    }
}
