// Public API - the runner drives the CLI; the subsystems are exposed so the
// server and pipeline can be embedded
pub mod runner;

pub mod coercion;
pub mod config;
pub mod db;
pub mod error;
pub mod formats;
pub mod http;
pub mod io;
pub mod pipeline;
pub mod preview;
pub mod telemetry;
