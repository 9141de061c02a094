//! Flowguard - water meter telemetry ingestion, aggregation and leak detection
//!
//! This library exposes the core modules for testing and embedding.

pub mod aggregator;
pub mod alerts;
pub mod common;
pub mod config;
pub mod detection;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod model;
pub mod routes;
pub mod store;
pub mod validator;
