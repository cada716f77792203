//! Curator - automated acquisition, normalization and streaming backend
//!
//! Releases discovered from a saved search query are pulled over BitTorrent,
//! re-encoded into a broadly streamable format, placed on the storage tier
//! with the most free space, and cataloged with metadata from TMDB. Stored
//! assets are served back over HTTP with byte-range support.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod services;
