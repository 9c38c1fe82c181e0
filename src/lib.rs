pub mod agents;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod grounding;
pub mod models;
pub mod ollama;
pub mod server;
pub mod toolserver;
pub mod tools;
