//! # allybridge-client
//!
//! Session-authenticated client for the Office Ally practice-management
//! portal. The portal has no sanctioned API; this crate drives the same
//! form posts and AJAX bridge calls a browser performs and decodes the
//! returned markup into the records defined by `allybridge-core`.
//!
//! This crate provides:
//! - Credential negotiation against the portal login form
//! - Transparent session-expiry recovery with a single replay
//! - Appointment listing by office, provider and service date
//! - Patient chart and progress-note retrieval
//! - Progress-note creation through the SOAP note editor
//!
//! The entry point is [`AllyClient`]; sessions, request orchestration and
//! markup decoding stay internal.

pub mod client;
pub mod config;

mod decode;
mod forms;
mod negotiate;
mod orchestrate;
mod session;
mod transport;

pub use client::AllyClient;
pub use config::{ClientConfig, ConfigError};
