//! The load cycle: task creation, joint settling, atomic publish and stale
//! result discard.

mod common;

use common::test_utils::{
    base_path, fixture_dir, gltf_with_materials, gltf_without_scenes, png_bytes, test_viewer,
    triangle_bin, write_fixture,
};
use futures::executor::block_on;
use vantage::{
    data_structures::{
        asset::Asset,
        image::{ImageDescriptor, Pixels},
    },
    resources::{DroppedFile, image::load_task, parse_description, split_dropped},
};

#[test]
fn should_publish_a_complete_asset() {
    let dir = fixture_dir("publish");
    write_fixture(&dir, "model.gltf", &gltf_with_materials(&["OPAQUE"]));
    let mut viewer = test_viewer(&base_path(&dir));

    block_on(viewer.load_from_path("model.gltf")).unwrap();

    let asset = viewer.current().expect("asset published");
    assert_eq!(asset.generation, 1);
    assert_eq!(asset.scenes.len(), 1);
    assert_eq!(asset.meshes.len(), 1);
    assert_eq!(asset.meshes[0].primitives[0].vertices.len(), 3);
    assert!(!viewer.is_loading());
    // Every image slot settled, environment placeholders included.
    assert!(asset.images.iter().all(ImageDescriptor::is_loaded));
}

#[test]
fn should_create_image_task_at_most_once() {
    let mut asset = Asset::new("model.gltf", 1);
    asset
        .images
        .push(ImageDescriptor::from_uri("texture.png", None));

    assert!(load_task(0, &asset.images[0], &asset, None).is_some());

    asset.images[0].set_pixels(Pixels::Placeholder);
    assert!(load_task(0, &asset.images[0], &asset, None).is_none());
}

#[test]
fn should_degrade_missing_sources_without_failing_the_load() {
    let dir = fixture_dir("missing");
    // References a buffer and an image that do not exist on disk.
    let json = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"uri": "missing.bin", "byteLength": 36}],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}],
        "images": [{"uri": "missing.png"}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "nodes": [{"mesh": 0}],
        "scenes": [{"nodes": [0]}],
        "scene": 0
    }"#;
    std::fs::write(dir.join("model.gltf"), json).unwrap();
    let mut viewer = test_viewer(&base_path(&dir));

    block_on(viewer.load_from_path("model.gltf")).unwrap();

    let asset = viewer.current().expect("asset published despite failures");
    assert!(asset.buffers[0].data().is_none());
    assert!(asset.meshes[0].primitives[0].vertices.is_empty());
    assert!(matches!(
        asset.images[0].pixels(),
        Some(Pixels::Placeholder)
    ));
}

#[test]
fn should_abort_on_empty_scenes_and_keep_previous_asset() {
    let dir = fixture_dir("empty-scenes");
    write_fixture(&dir, "good.gltf", &gltf_with_materials(&["OPAQUE"]));
    std::fs::write(dir.join("bad.gltf"), gltf_without_scenes()).unwrap();
    let mut viewer = test_viewer(&base_path(&dir));

    block_on(viewer.load_from_path("good.gltf")).unwrap();
    let retires = viewer.backend.retires;

    let result = block_on(viewer.load_from_path("bad.gltf"));
    assert!(result.is_err());

    // The failed load never retired anything; the previous asset is intact.
    let asset = viewer.current().expect("previous asset still published");
    assert_eq!(asset.generation, 1);
    assert_eq!(viewer.backend.retires, retires);
    assert!(!viewer.is_loading());
}

#[test]
fn should_discard_results_of_a_superseded_load() {
    let dir = fixture_dir("stale");
    write_fixture(&dir, "first.gltf", &gltf_with_materials(&["OPAQUE"]));
    std::fs::write(dir.join("second.gltf"), gltf_with_materials(&["BLEND"])).unwrap();
    let mut viewer = test_viewer(&base_path(&dir));

    let path_first = format!("{}first.gltf", base_path(&dir));
    let path_second = format!("{}second.gltf", base_path(&dir));

    let bytes = std::fs::read(&path_first).unwrap();
    let (doc_first, blob_first) = parse_description(&path_first, &bytes).unwrap();
    let bytes = std::fs::read(&path_second).unwrap();
    let (doc_second, blob_second) = parse_description(&path_second, &bytes).unwrap();

    let pending_first = viewer
        .begin_load(&path_first, &doc_first, blob_first, None)
        .unwrap();
    let pending_second = viewer
        .begin_load(&path_second, &doc_second, blob_second, None)
        .unwrap();

    let settled_first = block_on(pending_first.settle());
    let settled_second = block_on(pending_second.settle());

    viewer.finish_load(settled_second).unwrap();
    // The first load's results arrive after being superseded.
    viewer.finish_load(settled_first).unwrap();

    let asset = viewer.current().expect("asset published");
    assert_eq!(asset.path, path_second);
    assert_eq!(asset.generation, 2);
}

#[test]
fn should_resolve_dropped_files_by_name() {
    let json = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"uri": "tri.bin", "byteLength": 36}],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}],
        "images": [{"uri": "texture.png"}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "nodes": [{"mesh": 0}],
        "scenes": [{"nodes": [0]}],
        "scene": 0
    }"#;
    let main = DroppedFile {
        name: "model.gltf".into(),
        bytes: json.as_bytes().to_vec(),
    };
    let additional = vec![
        DroppedFile {
            name: "tri.bin".into(),
            bytes: triangle_bin(),
        },
        DroppedFile {
            name: "texture.png".into(),
            bytes: png_bytes(),
        },
    ];
    let mut viewer = test_viewer("");

    block_on(viewer.load_from_files(main, additional)).unwrap();

    // Nothing touched the filesystem; both sources came out of the drop.
    let asset = viewer.current().expect("asset published");
    assert!(asset.buffers[0].data().is_some());
    assert_eq!(asset.meshes[0].primitives[0].vertices.len(), 3);
    assert!(matches!(asset.images[0].pixels(), Some(Pixels::Decoded(_))));
}

#[test]
fn should_fall_back_to_the_uri_when_the_drop_misses() {
    let dir = fixture_dir("drop-miss");
    std::fs::write(dir.join("texture.png"), png_bytes()).unwrap();
    // The image is not part of the drop; its uri points at the disk copy.
    let json = format!(
        r#"{{
        "asset": {{"version": "2.0"}},
        "buffers": [{{"uri": "tri.bin", "byteLength": 36}}],
        "bufferViews": [{{"buffer": 0, "byteOffset": 0, "byteLength": 36}}],
        "accessors": [{{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}}],
        "images": [{{"uri": "{}/texture.png"}}],
        "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}}}]}}],
        "nodes": [{{"mesh": 0}}],
        "scenes": [{{"nodes": [0]}}],
        "scene": 0
    }}"#,
        dir.display()
    );
    let main = DroppedFile {
        name: "model.gltf".into(),
        bytes: json.into_bytes(),
    };
    let additional = vec![DroppedFile {
        name: "tri.bin".into(),
        bytes: triangle_bin(),
    }];
    let mut viewer = test_viewer("");

    block_on(viewer.load_from_files(main, additional)).unwrap();

    let asset = viewer.current().expect("asset published");
    assert!(asset.buffers[0].data().is_some());
    assert!(matches!(asset.images[0].pixels(), Some(Pixels::Decoded(_))));
}

#[test]
fn should_split_a_drop_into_description_and_auxiliary_files() {
    let file = |name: &str| DroppedFile {
        name: name.into(),
        bytes: Vec::new(),
    };

    let (main, additional) =
        split_dropped(vec![file("tri.bin"), file("model.gltf"), file("texture.png")])
            .expect("description found");
    assert_eq!(main.name, "model.gltf");
    assert_eq!(additional.len(), 2);

    assert!(split_dropped(vec![file("only.bin")]).is_none());
}

#[test]
fn should_clear_the_loading_indicator_when_the_fetch_fails() {
    let dir = fixture_dir("fetch-fail");
    let mut viewer = test_viewer(&base_path(&dir));
    // The application shell raises the indicator while the fetch is in
    // flight; a failed fetch must lower it again.
    viewer.set_loading_indicator(true);

    let result = block_on(viewer.load_from_path("missing.gltf"));
    assert!(result.is_err());
    assert!(!viewer.is_loading());
    assert!(viewer.current().is_none());
}

#[test]
fn should_retire_the_previous_asset_before_materializing() {
    let dir = fixture_dir("retire");
    write_fixture(&dir, "model.gltf", &gltf_with_materials(&["OPAQUE"]));
    let mut viewer = test_viewer(&base_path(&dir));

    block_on(viewer.load_from_path("model.gltf")).unwrap();
    assert_eq!(viewer.backend.retires, 1);

    block_on(viewer.load_from_path("model.gltf")).unwrap();
    assert_eq!(viewer.backend.retires, 2);
    assert_eq!(viewer.current().unwrap().generation, 2);
}
