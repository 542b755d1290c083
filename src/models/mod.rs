//! Domain models for authgate
//!
//! This module contains the core domain models used throughout the application.

pub mod identity;

pub use identity::Identity;
