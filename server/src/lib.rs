//! CodeSafe library
//!
//! Notes addressed by an access code, optionally locked with a PIN, with
//! file attachments kept in object storage. The binary wires these modules
//! into an HTTP server; tests drive them directly.

pub mod app;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod handlers;
pub mod services;
pub mod session;
pub mod storage;
pub mod validation;
