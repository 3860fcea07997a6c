//! Google Cloud Storage backed media storage.
//!
//! Maps local media paths onto bucket object keys, backfills missing objects
//! from a fallback origin and mirrors bucket objects into the local media
//! directory on demand.

pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod services;
