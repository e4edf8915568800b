pub mod engine;
pub mod models;
pub mod repository;
pub mod statement;

pub use engine::ReconciliationEngine;
pub use repository::ReconciliationRepository;
