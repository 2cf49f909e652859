//! Shared fixtures: a recording draw backend and on-disk glTF scene builders.

use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::Result;
use vantage::{
    data_structures::asset::Asset,
    render::{DrawBackend, DrawPass, FrameCamera},
    viewer::{Viewer, ViewerOptions},
};

/// One recorded `render` call.
#[derive(Clone, Debug)]
pub struct RecordedFrame {
    pub generation: u64,
    pub passes: Vec<DrawPass>,
    pub scale: f32,
}

/// A draw backend that records the frame plans it receives instead of
/// touching a GPU.
#[derive(Default)]
pub struct RecordingBackend {
    pub retires: usize,
    pub resizes: Vec<(u32, u32)>,
    pub frames: Vec<RecordedFrame>,
}

impl DrawBackend for RecordingBackend {
    fn retire(&mut self) {
        self.retires += 1;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
    }

    fn render(
        &mut self,
        asset: &Asset,
        passes: &[DrawPass],
        _camera: &FrameCamera,
        scale: f32,
    ) -> Result<()> {
        self.frames.push(RecordedFrame {
            generation: asset.generation,
            passes: passes.to_vec(),
            scale,
        });
        Ok(())
    }
}

/// A viewer over a recording backend, with a small environment so missing
/// environment files stay cheap.
pub fn test_viewer(base_path: &str) -> Viewer<RecordingBackend> {
    let options = ViewerOptions {
        base_path: base_path.into(),
        environment_mip_count: 1,
        headless: true,
        ..Default::default()
    };
    Viewer::new(RecordingBackend::default(), options)
}

static FIXTURE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A fresh per-test directory under the system temp dir.
pub fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "vantage-{name}-{}-{}",
        std::process::id(),
        FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&dir).expect("create fixture dir");
    dir
}

/// The fixture directory as a base path (trailing separator included).
pub fn base_path(dir: &PathBuf) -> String {
    format!("{}/", dir.display())
}

/// Little-endian positions of one triangle, the payload behind `tri.bin`.
pub fn triangle_bin() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    positions.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// A decodable one-pixel png payload.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 0, 255]))
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("encode fixture png");
    bytes
}

/// Write a description plus its triangle buffer into `dir`.
pub fn write_fixture(dir: &PathBuf, name: &str, json: &str) {
    fs::write(dir.join("tri.bin"), triangle_bin()).expect("write tri.bin");
    fs::write(dir.join(name), json).expect("write description");
}

const BUFFER_TABLES: &str = r#"
    "buffers": [{"uri": "tri.bin", "byteLength": 36}],
    "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
    "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                   "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}]"#;

/// A single-scene description with one triangle node per material, in
/// material order. `alpha_modes` entries are glTF alpha mode names.
pub fn gltf_with_materials(alpha_modes: &[&str]) -> String {
    let materials = alpha_modes
        .iter()
        .map(|mode| format!(r#"{{"alphaMode": "{mode}"}}"#))
        .collect::<Vec<_>>()
        .join(", ");
    let meshes = (0..alpha_modes.len())
        .map(|i| {
            format!(r#"{{"primitives": [{{"attributes": {{"POSITION": 0}}, "material": {i}}}]}}"#)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let nodes = (0..alpha_modes.len())
        .map(|i| format!(r#"{{"mesh": {i}, "translation": [{i}.0, 0.0, 0.0]}}"#))
        .collect::<Vec<_>>()
        .join(", ");
    let roots = (0..alpha_modes.len())
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"{{
    "asset": {{"version": "2.0"}},{BUFFER_TABLES},
    "materials": [{materials}],
    "meshes": [{meshes}],
    "nodes": [{nodes}],
    "scenes": [{{"nodes": [{roots}]}}],
    "scene": 0
}}"#
    )
}

/// A description with `scene_count` scenes, each holding one triangle node.
pub fn gltf_with_scenes(scene_count: usize) -> String {
    let nodes = (0..scene_count)
        .map(|_| r#"{"mesh": 0}"#.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let scenes = (0..scene_count)
        .map(|i| format!(r#"{{"nodes": [{i}]}}"#))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"{{
    "asset": {{"version": "2.0"}},{BUFFER_TABLES},
    "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}}}]}}],
    "nodes": [{nodes}],
    "scenes": [{scenes}],
    "scene": 0
}}"#
    )
}

/// A description that declares no scenes at all.
pub fn gltf_without_scenes() -> String {
    r#"{"asset": {"version": "2.0"}}"#.to_string()
}
