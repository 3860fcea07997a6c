//! Core data models for the media storage adapter.
//!
//! Object handles, listing pages, upload inputs, bulk export/import records
//! and the persisted synchronization flag.

pub mod listing;
pub mod media_file;
pub mod object;
pub mod sync_flag;
pub mod upload;
