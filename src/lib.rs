//! taskboard: Task board backend in Rust
//!
//! Users own boards, boards hold containers (columns), containers hold tasks.
//! - Storage: Sled trees with multi-tree transactions for cascades
//! - Auth: bcrypt passwords, HS256 bearer tokens
//! - Sync: full-replace reconciliation of one board per request
//! - REST: Axum HTTP/JSON handlers

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod models;
pub mod rest;
pub mod storage;
// Full-replace board synchronisation used by /update-user-data
pub mod sync;
