//! HTTP API - axum routes over the preview service and the ingestion pipeline

pub mod app_server;
pub mod error;
pub mod handlers;
pub mod models;

pub use app_server::{AppServer, AppState};
