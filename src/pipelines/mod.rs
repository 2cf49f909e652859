//! Render pipeline definitions for the scene passes.

pub mod scene;
