//! Core library: dataset scanning, tag reconciliation, batched upload,
//! training orchestration and reporting.

pub mod clock;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod stats;
pub mod tags;
pub mod training;
pub mod uploader;
