//! The renderable asset and its descriptor tables.
//!
//! An [`Asset`] is the published unit the render loop consumes: tables of
//! images, samplers, textures, materials, meshes, nodes and scenes, populated
//! synchronously from a parsed glTF document and completed asynchronously as
//! buffers and images resolve. Once published the asset is read-only; a new
//! load builds a fresh instance and swaps it in wholesale.

use cgmath::{Matrix4, One, Quaternion, SquareMatrix, Vector3, Vector4};

use crate::{
    camera::AssetProjection,
    data_structures::image::{ImageDescriptor, MimeType},
};

/// A local transform in decomposed form, as glTF nodes declare it.
#[derive(Clone, Debug)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl ModelVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x3];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// How a material's alpha channel is composited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaMode {
    Opaque,
    Mask,
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MaterialDescriptor {
    pub name: Option<String>,
    pub base_color_texture: Option<usize>,
    pub base_color_factor: [f32; 4],
    pub alpha_mode: AlphaMode,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            base_color_texture: None,
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            alpha_mode: AlphaMode::Opaque,
        }
    }
}

/// Filtering and addressing state for a texture, in wgpu terms.
#[derive(Clone, Debug)]
pub struct SamplerDescriptor {
    pub name: Option<String>,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    Cube,
}

/// References one sampler and an ordered sequence of image indices: length 1
/// for plain textures, `6 * (mips + 1)` for a mipped cube map.
#[derive(Clone, Debug)]
pub struct TextureDescriptor {
    pub sampler: Option<usize>,
    pub images: Vec<usize>,
    pub kind: TextureKind,
}

#[derive(Clone, Debug, Default)]
pub struct BufferDescriptor {
    pub uri: Option<String>,
    pub byte_length: usize,
    data: Option<Vec<u8>>,
}

impl BufferDescriptor {
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Write-once hand-off of fetched buffer bytes.
    pub fn set_data(&mut self, data: Vec<u8>) {
        if self.data.is_some() {
            log::warn!("discarding duplicate buffer result for {:?}", self.uri);
            return;
        }
        self.data = Some(data);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferViewDescriptor {
    pub buffer: usize,
    pub offset: usize,
    pub length: usize,
}

#[derive(Clone, Debug)]
pub struct Primitive {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: Option<String>,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    pub local: Transform,
    pub world: Matrix4<f32>,
}

impl Node {
    pub fn new(mesh: Option<usize>) -> Self {
        Self {
            name: None,
            children: Vec::new(),
            mesh,
            camera: None,
            local: Transform::identity(),
            world: Matrix4::identity(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssetCamera {
    pub node: Option<usize>,
    pub projection: AssetProjection,
}

/// An ordered list of root node indices.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// The published, renderable unit.
#[derive(Debug, Default)]
pub struct Asset {
    pub path: String,
    pub generation: u64,
    /// The description's default scene, if declared.
    pub scene: Option<usize>,
    pub scenes: Vec<Scene>,
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MaterialDescriptor>,
    pub textures: Vec<TextureDescriptor>,
    pub samplers: Vec<SamplerDescriptor>,
    pub images: Vec<ImageDescriptor>,
    pub buffers: Vec<BufferDescriptor>,
    pub buffer_views: Vec<BufferViewDescriptor>,
    pub cameras: Vec<AssetCamera>,
    document: Option<gltf::Document>,
}

impl Asset {
    pub fn new(path: impl Into<String>, generation: u64) -> Self {
        Self {
            path: path.into(),
            generation,
            ..Default::default()
        }
    }

    /// Populate the descriptor tables from a parsed description. Mesh vertex
    /// data is deferred to [`build_meshes`](Self::build_meshes) since it may
    /// depend on buffers that are still being fetched.
    pub fn from_document(
        path: impl Into<String>,
        generation: u64,
        document: &gltf::Document,
        blob: Option<Vec<u8>>,
    ) -> Self {
        let path = path.into();
        let dir = base_dir(&path);
        let mut asset = Asset::new(path, generation);

        let mut blob = blob;
        for buffer in document.buffers() {
            let mut descriptor = BufferDescriptor {
                uri: None,
                byte_length: buffer.length(),
                data: None,
            };
            match buffer.source() {
                gltf::buffer::Source::Bin => {
                    if let Some(blob) = blob.take() {
                        descriptor.data = Some(blob);
                    }
                }
                gltf::buffer::Source::Uri(uri) => {
                    descriptor.uri = Some(format!("{dir}{uri}"));
                }
            }
            asset.buffers.push(descriptor);
        }

        for view in document.views() {
            asset.buffer_views.push(BufferViewDescriptor {
                buffer: view.buffer().index(),
                offset: view.offset(),
                length: view.length(),
            });
        }

        for image in document.images() {
            let descriptor = match image.source() {
                gltf::image::Source::Uri { uri, mime_type } => ImageDescriptor::from_uri(
                    format!("{dir}{uri}"),
                    mime_type.and_then(MimeType::from_declared),
                ),
                gltf::image::Source::View { view, mime_type } => {
                    ImageDescriptor::from_buffer_view(
                        view.index(),
                        MimeType::from_declared(mime_type),
                    )
                }
            };
            asset.images.push(descriptor);
        }

        for sampler in document.samplers() {
            asset.samplers.push(convert_sampler(&sampler));
        }

        for texture in document.textures() {
            asset.textures.push(TextureDescriptor {
                sampler: texture.sampler().index(),
                images: vec![texture.source().index()],
                kind: TextureKind::D2,
            });
        }

        for material in document.materials() {
            if material.index().is_none() {
                continue;
            }
            let pbr = material.pbr_metallic_roughness();
            asset.materials.push(MaterialDescriptor {
                name: material.name().map(str::to_string),
                base_color_texture: pbr.base_color_texture().map(|info| info.texture().index()),
                base_color_factor: pbr.base_color_factor(),
                alpha_mode: material.alpha_mode().into(),
            });
        }

        for camera in document.cameras() {
            let projection = match camera.projection() {
                gltf::camera::Projection::Perspective(p) => AssetProjection::Perspective {
                    yfov: cgmath::Rad(p.yfov()),
                    znear: p.znear(),
                    zfar: p.zfar(),
                    aspect_ratio: p.aspect_ratio(),
                },
                gltf::camera::Projection::Orthographic(o) => AssetProjection::Orthographic {
                    xmag: o.xmag(),
                    ymag: o.ymag(),
                    znear: o.znear(),
                    zfar: o.zfar(),
                },
            };
            asset.cameras.push(AssetCamera {
                node: None,
                projection,
            });
        }

        for node in document.nodes() {
            let (position, rotation, scale) = node.transform().decomposed();
            if let Some(camera) = node.camera() {
                if let Some(asset_camera) = asset.cameras.get_mut(camera.index()) {
                    asset_camera.node = Some(node.index());
                }
            }
            asset.nodes.push(Node {
                name: node.name().map(str::to_string),
                children: node.children().map(|child| child.index()).collect(),
                mesh: node.mesh().map(|mesh| mesh.index()),
                camera: node.camera().map(|camera| camera.index()),
                local: Transform {
                    position: position.into(),
                    rotation: rotation.into(),
                    scale: scale.into(),
                },
                world: Matrix4::identity(),
            });
        }

        for scene in document.scenes() {
            asset.scenes.push(Scene {
                name: scene.name().map(str::to_string),
                nodes: scene.nodes().map(|node| node.index()).collect(),
            });
        }
        asset.scene = document.default_scene().map(|scene| scene.index());

        asset.document = Some(document.clone());
        asset
    }

    /// Extract CPU-side mesh data from the parsed description. Runs after all
    /// buffer loads have settled; primitives whose backing buffer failed to
    /// load come out empty rather than aborting the asset.
    pub fn build_meshes(&mut self) {
        let Some(document) = self.document.clone() else {
            return;
        };
        for mesh in document.meshes() {
            let mut primitives = Vec::new();
            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| {
                    self.buffers.get(buffer.index()).and_then(|b| b.data())
                });

                let mut vertices = Vec::new();
                if let Some(positions) = reader.read_positions() {
                    vertices.extend(positions.map(|position| ModelVertex {
                        position,
                        tex_coords: Default::default(),
                        normal: Default::default(),
                    }));
                }
                if let Some(normals) = reader.read_normals() {
                    for (vertex, normal) in vertices.iter_mut().zip(normals) {
                        vertex.normal = normal;
                    }
                }
                if let Some(tex_coords) = reader.read_tex_coords(0).map(|t| t.into_f32()) {
                    for (vertex, tex_coord) in vertices.iter_mut().zip(tex_coords) {
                        vertex.tex_coords = tex_coord;
                    }
                }

                let indices = reader
                    .read_indices()
                    .map(|raw| raw.into_u32().collect())
                    .unwrap_or_else(|| (0..vertices.len() as u32).collect());

                if vertices.is_empty() {
                    log::warn!(
                        "mesh {:?} primitive has no vertex data, its buffer may have failed to load",
                        mesh.name()
                    );
                }

                let bounds = primitive.bounding_box();
                primitives.push(Primitive {
                    vertices,
                    indices,
                    material: primitive.material().index(),
                    bbox_min: bounds.min,
                    bbox_max: bounds.max,
                });
            }
            self.meshes.push(Mesh {
                name: mesh.name().map(str::to_string),
                primitives,
            });
        }
    }

    /// Resolve a buffer-view byte range into owned bytes, if the backing
    /// buffer's data is present.
    pub fn resolve_view(&self, view_index: usize) -> Option<Vec<u8>> {
        let view = self.buffer_views.get(view_index)?;
        let data = self.buffers.get(view.buffer)?.data()?;
        data.get(view.offset..view.offset + view.length)
            .map(<[u8]>::to_vec)
    }

    /// Materialize world transforms for one scene: computed once per load, or
    /// again on an explicit external transform change.
    pub fn apply_transform_hierarchy(&mut self, scene_index: usize) {
        let Some(scene) = self.scenes.get(scene_index) else {
            return;
        };
        let mut stack: Vec<(usize, Matrix4<f32>)> = scene
            .nodes
            .iter()
            .map(|&root| (root, Matrix4::identity()))
            .collect();
        while let Some((index, parent)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(index) else {
                continue;
            };
            node.world = parent * node.local.to_matrix();
            let world = node.world;
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }
    }

    /// Nodes of a scene carrying a mesh, in traversal order.
    pub fn scene_mesh_nodes(&self, scene_index: usize) -> Vec<usize> {
        self.collect_nodes(scene_index, |_| true)
    }

    /// Filtered view of a scene's mesh nodes by alpha mode. With
    /// `invert == false` this yields the nodes drawing with `mode`; with
    /// `invert == true`, everything else. The two views partition the scene.
    pub fn nodes_with_alpha_mode(
        &self,
        scene_index: usize,
        mode: AlphaMode,
        invert: bool,
    ) -> Vec<usize> {
        self.collect_nodes(scene_index, |mesh| {
            let matches = mesh.primitives.iter().any(|primitive| {
                let material_mode = primitive
                    .material
                    .and_then(|index| self.materials.get(index))
                    .map(|material| material.alpha_mode)
                    .unwrap_or(AlphaMode::Opaque);
                material_mode == mode
            });
            matches != invert
        })
    }

    fn collect_nodes(&self, scene_index: usize, keep: impl Fn(&Mesh) -> bool) -> Vec<usize> {
        let Some(scene) = self.scenes.get(scene_index) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<usize> = scene.nodes.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if let Some(mesh) = node.mesh.and_then(|m| self.meshes.get(m)) {
                if keep(mesh) {
                    out.push(index);
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// World-space bounding box of one scene, from the materialized
    /// transforms and the primitives' local bounds.
    pub fn bounding_box(&self, scene_index: usize) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let mut bounds: Option<(Vector3<f32>, Vector3<f32>)> = None;
        for index in self.scene_mesh_nodes(scene_index) {
            let node = &self.nodes[index];
            let Some(mesh) = node.mesh.and_then(|m| self.meshes.get(m)) else {
                continue;
            };
            for primitive in &mesh.primitives {
                for corner in bbox_corners(primitive.bbox_min, primitive.bbox_max) {
                    let world = node.world * Vector4::new(corner[0], corner[1], corner[2], 1.0);
                    let point = Vector3::new(world.x, world.y, world.z);
                    bounds = Some(match bounds {
                        None => (point, point),
                        Some((min, max)) => (
                            Vector3::new(min.x.min(point.x), min.y.min(point.y), min.z.min(point.z)),
                            Vector3::new(max.x.max(point.x), max.y.max(point.y), max.z.max(point.z)),
                        ),
                    });
                }
            }
        }
        bounds
    }
}

fn bbox_corners(min: [f32; 3], max: [f32; 3]) -> [[f32; 3]; 8] {
    [
        [min[0], min[1], min[2]],
        [max[0], min[1], min[2]],
        [min[0], max[1], min[2]],
        [max[0], max[1], min[2]],
        [min[0], min[1], max[2]],
        [max[0], min[1], max[2]],
        [min[0], max[1], max[2]],
        [max[0], max[1], max[2]],
    ]
}

/// Everything up to and including the final path separator, or empty.
pub(crate) fn base_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(split) => path[..=split].to_string(),
        None => String::new(),
    }
}

fn convert_sampler(sampler: &gltf::texture::Sampler) -> SamplerDescriptor {
    use gltf::texture::{MagFilter, MinFilter, WrappingMode};

    let address = |mode: WrappingMode| match mode {
        WrappingMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrappingMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrappingMode::Repeat => wgpu::AddressMode::Repeat,
    };
    let (min_filter, mipmap_filter) = match sampler.min_filter() {
        Some(MinFilter::Nearest) | Some(MinFilter::NearestMipmapNearest) => {
            (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest)
        }
        Some(MinFilter::NearestMipmapLinear) => {
            (wgpu::FilterMode::Nearest, wgpu::FilterMode::Linear)
        }
        Some(MinFilter::LinearMipmapNearest) => {
            (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest)
        }
        Some(MinFilter::Linear) | Some(MinFilter::LinearMipmapLinear) | None => {
            (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear)
        }
    };
    SamplerDescriptor {
        name: sampler.name().map(str::to_string),
        mag_filter: match sampler.mag_filter() {
            Some(MagFilter::Nearest) => wgpu::FilterMode::Nearest,
            _ => wgpu::FilterMode::Linear,
        },
        min_filter,
        mipmap_filter,
        address_mode_u: address(sampler.wrap_s()),
        address_mode_v: address(sampler.wrap_t()),
    }
}
