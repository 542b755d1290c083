//! authgate - session and token authentication for a CRUD API
//!
//! This crate provides an in-process session registry with sliding idle
//! expiry, HMAC-signed identity tokens, and axum middleware that turns a
//! request credential into a typed identity and enforces role checks.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod telemetry;
