//! The frame walk: rendering gate, scene clamping and the opaque/blend split.

mod common;

use std::{cell::Cell, rc::Rc};

use common::test_utils::{
    base_path, fixture_dir, gltf_with_materials, gltf_with_scenes, test_viewer, write_fixture,
};
use futures::executor::block_on;

#[test]
fn should_not_draw_before_an_asset_is_published() {
    let mut viewer = test_viewer("");
    viewer.render_frame();
    assert!(viewer.backend.frames.is_empty());
}

#[test]
fn should_clamp_the_scene_selection() {
    let dir = fixture_dir("clamp");
    write_fixture(&dir, "model.gltf", &gltf_with_scenes(3));
    let mut viewer = test_viewer(&base_path(&dir));
    block_on(viewer.load_from_path("model.gltf")).unwrap();

    for (requested, expected) in [(-5, 0), (0, 0), (2, 2), (3, 2), (7, 2)] {
        viewer.set_scene_index(requested);
        viewer.render_frame();
        assert_eq!(viewer.scene_index(), expected, "requested {requested}");
    }
    assert_eq!(viewer.backend.frames.len(), 5);
}

#[test]
fn should_step_scenes_with_clamping() {
    let dir = fixture_dir("step");
    write_fixture(&dir, "model.gltf", &gltf_with_scenes(2));
    let mut viewer = test_viewer(&base_path(&dir));
    block_on(viewer.load_from_path("model.gltf")).unwrap();

    viewer.next_scene();
    viewer.render_frame();
    assert_eq!(viewer.scene_index(), 1);

    viewer.next_scene();
    viewer.render_frame();
    assert_eq!(viewer.scene_index(), 1);

    viewer.previous_scene();
    viewer.previous_scene();
    viewer.render_frame();
    assert_eq!(viewer.scene_index(), 0);
}

#[test]
fn should_split_blended_nodes_into_their_own_pass() {
    let dir = fixture_dir("split");
    write_fixture(
        &dir,
        "model.gltf",
        &gltf_with_materials(&["OPAQUE", "BLEND", "OPAQUE"]),
    );
    let mut viewer = test_viewer(&base_path(&dir));
    block_on(viewer.load_from_path("model.gltf")).unwrap();

    viewer.render_frame();

    let frame = viewer.backend.frames.last().expect("one frame drawn");
    assert_eq!(frame.passes.len(), 2);
    assert!(!frame.passes[0].blended);
    assert_eq!(frame.passes[0].nodes, vec![0, 2]);
    assert!(frame.passes[1].blended);
    assert_eq!(frame.passes[1].nodes, vec![1]);
}

#[test]
fn should_draw_a_single_pass_when_nothing_blends() {
    let dir = fixture_dir("opaque");
    write_fixture(
        &dir,
        "model.gltf",
        &gltf_with_materials(&["OPAQUE", "MASK", "OPAQUE"]),
    );
    let mut viewer = test_viewer(&base_path(&dir));
    block_on(viewer.load_from_path("model.gltf")).unwrap();

    viewer.render_frame();

    let frame = viewer.backend.frames.last().expect("one frame drawn");
    assert_eq!(frame.passes.len(), 1);
    assert!(!frame.passes[0].blended);
    assert_eq!(frame.passes[0].nodes, vec![0, 1, 2]);
}

#[test]
fn should_sort_blended_nodes_back_to_front() {
    let dir = fixture_dir("sort");
    // Three blended triangles at z = 0, 1, 2; the camera looks down -z from
    // positive z, so the draw order must be ascending z.
    let json = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"uri": "tri.bin", "byteLength": 36}],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}],
        "materials": [{"alphaMode": "BLEND"}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "material": 0}]}],
        "nodes": [
            {"mesh": 0, "translation": [0.0, 0.0, 0.0]},
            {"mesh": 0, "translation": [0.0, 0.0, 1.0]},
            {"mesh": 0, "translation": [0.0, 0.0, 2.0]}
        ],
        "scenes": [{"nodes": [0, 1, 2]}],
        "scene": 0
    }"#;
    std::fs::write(dir.join("tri.bin"), common::test_utils::triangle_bin()).unwrap();
    std::fs::write(dir.join("model.gltf"), json).unwrap();
    let mut viewer = test_viewer(&base_path(&dir));
    block_on(viewer.load_from_path("model.gltf")).unwrap();

    viewer.render_frame();

    let frame = viewer.backend.frames.last().expect("one frame drawn");
    let blended = frame.passes.iter().find(|pass| pass.blended).unwrap();
    // Farthest from the camera first.
    assert_eq!(blended.nodes, vec![0, 1, 2]);
}

#[test]
fn should_report_each_rendered_frame() {
    let dir = fixture_dir("ready");
    write_fixture(&dir, "model.gltf", &gltf_with_materials(&["OPAQUE"]));
    let mut viewer = test_viewer(&base_path(&dir));
    block_on(viewer.load_from_path("model.gltf")).unwrap();

    let rendered = Rc::new(Cell::new(0u32));
    let counter = rendered.clone();
    viewer.on_frame_ready(move || counter.set(counter.get() + 1));

    viewer.render_frame();
    viewer.render_frame();
    assert_eq!(rendered.get(), 2);
}
