//! Viewer data structures: assets, descriptors, and GPU textures.
//!
//! - `asset` contains the published asset unit and its descriptor tables
//! - `image` contains image descriptors and decoded pixel payloads
//! - `texture` contains the GPU texture wrapper and creation utilities

pub mod asset;
pub mod image;
pub mod texture;
