//! vantage
//!
//! A cross-platform glTF scene viewer for native and WASM targets. Assets are
//! fetched from remote URIs, the local filesystem or drag-and-dropped files,
//! decoded concurrently, and published atomically to a wgpu-based render
//! loop with separate opaque and alpha-blended passes.
//!
//! High-level modules
//! - `app`: window creation, event loop and input routing
//! - `camera`: the orbit camera, projection math and view fitting
//! - `context`: central GPU and window context that owns device/queue/surface
//! - `data_structures`: asset descriptor tables, images and GPU textures
//! - `envmap`: procedural environment-map synthesis
//! - `pipelines`: the opaque and alpha-blend scene pipelines
//! - `postprocess`: passes over the settled image table
//! - `render`: the draw backend seam and the wgpu renderer
//! - `resources`: async byte acquisition for buffers and images
//! - `viewer`: load-cycle orchestration and the per-frame scene walk
//!

pub mod app;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod envmap;
pub mod pipelines;
pub mod postprocess;
pub mod render;
pub mod resources;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use app::run;
pub use camera::CameraOptions;
pub use data_structures::asset::Asset;
pub use viewer::{Viewer, ViewerOptions};
