pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod global;
pub mod pipeline;
pub mod summarization;
pub mod transcription;
