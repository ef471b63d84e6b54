//! # allybridge-server
//!
//! HTTP facade over `allybridge-client`: a small JSON API whose handlers
//! drive the portal operations through one shared client, so consumers
//! never deal with sessions, postbacks or markup.
//!
//! This crate provides:
//! - REST endpoints for appointments, patient records and progress notes
//! - Stable machine-readable error codes mapped onto HTTP statuses
//! - TOML + environment configuration with validation
//! - Structured request logging with a reloadable level

pub mod config;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use error::ApiError;
pub use server::{AllyBridgeServer, ServerBuilder, build_app};
