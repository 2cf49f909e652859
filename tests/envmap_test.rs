//! Environment-map synthesis: index bookkeeping across the append passes.

use vantage::{
    data_structures::{
        asset::{Asset, TextureKind},
        image::MimeType,
    },
    envmap::add_environment_map,
};

const FACES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

#[test]
fn should_append_consistent_image_indices() {
    let mut asset = Asset::new("model.gltf", 1);
    add_environment_map(&mut asset, "", "papermill", 3, MimeType::Jpeg).unwrap();

    assert_eq!(asset.textures.len(), 3);
    assert_eq!(asset.samplers.len(), 3);
    for texture in &asset.textures {
        for &index in &texture.images {
            assert!(index < asset.images.len(), "dangling image index {index}");
        }
    }
    // 6 diffuse + 6 * 4 specular + 1 LUT
    assert_eq!(asset.images.len(), 31);
}

#[test]
fn should_order_specular_faces_face_major_mip_minor() {
    let mut asset = Asset::new("model.gltf", 1);
    add_environment_map(&mut asset, "base/", "papermill", 2, MimeType::Hdr).unwrap();

    let specular = &asset.textures[1];
    assert_eq!(specular.kind, TextureKind::Cube);
    assert_eq!(specular.images.len(), 6 * 3);

    for (face_slot, face) in FACES.iter().enumerate() {
        for mip in 0..=2 {
            let image_index = specular.images[face_slot * 3 + mip];
            let uri = asset.images[image_index].uri.as_deref().unwrap();
            assert_eq!(
                uri,
                &format!("base/assets/images/papermill/specular/specular_{face}_{mip}.hdr")
            );
            assert_eq!(asset.images[image_index].mip_level, mip as u32);
        }
    }
}

#[test]
fn should_reference_diffuse_faces_and_lut() {
    let mut asset = Asset::new("model.gltf", 1);
    add_environment_map(&mut asset, "", "papermill", 1, MimeType::Jpeg).unwrap();

    let diffuse = &asset.textures[0];
    assert_eq!(diffuse.kind, TextureKind::Cube);
    assert_eq!(diffuse.images.len(), 6);
    for (face_slot, face) in FACES.iter().enumerate() {
        let uri = asset.images[diffuse.images[face_slot]].uri.as_deref().unwrap();
        assert_eq!(
            uri,
            &format!("assets/images/papermill/diffuse/diffuse_{face}_0.jpg")
        );
    }

    let lut = &asset.textures[2];
    assert_eq!(lut.kind, TextureKind::D2);
    assert_eq!(lut.images.len(), 1);
    let uri = asset.images[lut.images[0]].uri.as_deref().unwrap();
    assert_eq!(uri, "assets/images/brdfLUT.png");
    assert_eq!(lut.images[0], asset.images.len() - 1);
}

#[test]
fn should_reject_unsupported_environment_kind_untouched() {
    let mut asset = Asset::new("model.gltf", 1);
    let result = add_environment_map(&mut asset, "", "papermill", 9, MimeType::Png);

    assert!(result.is_err());
    assert!(asset.images.is_empty());
    assert!(asset.textures.is_empty());
    assert!(asset.samplers.is_empty());
}
