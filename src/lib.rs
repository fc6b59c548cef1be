pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod server;
