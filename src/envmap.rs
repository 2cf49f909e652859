//! Procedural environment-map synthesis.
//!
//! Appends the image, sampler and texture descriptors for image-based
//! lighting to an asset before resource loading starts: a diffuse irradiance
//! cube, a specular prefiltered cube with per-mip faces, and a 2-D BRDF
//! lookup texture. The file layout follows the asset path convention
//! `<base>/assets/images/<folder>/{diffuse,specular}/...`.

use anyhow::{Result, bail};

use crate::data_structures::{
    asset::{Asset, SamplerDescriptor, TextureDescriptor, TextureKind},
    image::{CubeFace, ImageDescriptor, MimeType},
};

/// A monotonically increasing image-index cursor.
///
/// The diffuse and specular append passes share one cursor: every appended
/// image takes its index from here, in append order. Recomputing indices from
/// the table length mid-pass is how off-by-one bugs creep in, so all index
/// bookkeeping goes through this.
struct IndexCursor {
    next: usize,
}

impl IndexCursor {
    fn at(next: usize) -> Self {
        Self { next }
    }

    fn next(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        index
    }
}

/// Append the environment-map asset graph for `folder` with
/// `mip_level_count + 1` specular mips per face.
///
/// Only Jpeg and Hdr environments exist on disk; any other kind is a
/// configuration error and aborts before the asset is touched.
pub fn add_environment_map(
    asset: &mut Asset,
    base_path: &str,
    folder: &str,
    mip_level_count: u32,
    kind: MimeType,
) -> Result<()> {
    let extension = match kind {
        MimeType::Jpeg => ".jpg",
        MimeType::Hdr => ".hdr",
        other => bail!("unsupported environment image kind: {other:?}"),
    };

    let images_folder = format!("{base_path}assets/images/{folder}/");
    let diffuse_prefix = format!("{images_folder}diffuse/diffuse_");
    let specular_prefix = format!("{images_folder}specular/specular_");

    asset.samplers.push(SamplerDescriptor {
        name: Some("DiffuseCubeMapSampler".into()),
        mipmap_filter: wgpu::FilterMode::Nearest,
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        ..Default::default()
    });
    let diffuse_sampler = asset.samplers.len() - 1;

    asset.samplers.push(SamplerDescriptor {
        name: Some("SpecularCubeMapSampler".into()),
        mipmap_filter: wgpu::FilterMode::Linear,
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        ..Default::default()
    });
    let specular_sampler = asset.samplers.len() - 1;

    asset.samplers.push(SamplerDescriptor {
        name: Some("LUTSampler".into()),
        mipmap_filter: wgpu::FilterMode::Nearest,
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        ..Default::default()
    });
    let lut_sampler = asset.samplers.len() - 1;

    let mut cursor = IndexCursor::at(asset.images.len());

    // Diffuse irradiance cube: one image per face, mip 0 only.
    let mut diffuse_indices = Vec::with_capacity(6);
    for face in CubeFace::ORDER {
        let uri = format!("{diffuse_prefix}{}_0{extension}", face.file_name());
        asset
            .images
            .push(ImageDescriptor::from_uri(uri, Some(kind)).with_face(face, 0));
        diffuse_indices.push(cursor.next());
    }
    asset.textures.push(TextureDescriptor {
        sampler: Some(diffuse_sampler),
        images: diffuse_indices,
        kind: TextureKind::Cube,
    });

    // Specular prefiltered cube: face-major, mip-minor. The cursor carries
    // over from the diffuse pass.
    let mut specular_indices = Vec::with_capacity(6 * (mip_level_count as usize + 1));
    for face in CubeFace::ORDER {
        for mip in 0..=mip_level_count {
            let uri = format!("{specular_prefix}{}_{mip}{extension}", face.file_name());
            asset
                .images
                .push(ImageDescriptor::from_uri(uri, Some(kind)).with_face(face, mip));
            specular_indices.push(cursor.next());
        }
    }
    asset.textures.push(TextureDescriptor {
        sampler: Some(specular_sampler),
        images: specular_indices,
        kind: TextureKind::Cube,
    });

    // BRDF lookup table, always png.
    let lut_uri = format!("{base_path}assets/images/brdfLUT.png");
    asset
        .images
        .push(ImageDescriptor::from_uri(lut_uri, Some(MimeType::Png)));
    asset.textures.push(TextureDescriptor {
        sampler: Some(lut_sampler),
        images: vec![cursor.next()],
        kind: TextureKind::D2,
    });

    debug_assert_eq!(cursor.next, asset.images.len());
    Ok(())
}
