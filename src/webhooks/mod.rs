pub mod ingestor;
pub mod models;
pub mod signature;

pub use ingestor::{WebhookConfig, WebhookIngestor};
pub use models::WebhookLogRepository;
