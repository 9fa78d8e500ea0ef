//! services/api/src/lib.rs
//!
//! Library crate for the API service. The `api` and `openapi` binaries are
//! thin wrappers around the modules exposed here.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
