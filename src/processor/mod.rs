pub mod client;

pub use client::{ProcessorClient, ProcessorConfig, SubmissionService};
