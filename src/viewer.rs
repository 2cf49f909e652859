//! The viewer: load-cycle orchestration and the per-frame scene walk.
//!
//! A load runs in three phases. [`Viewer::begin_load`] validates the parsed
//! description, retires the previous asset and materializes the new one's
//! descriptor tables plus its environment map, collecting one independent
//! task per missing buffer and image. [`PendingLoad::settle`] awaits all of
//! them jointly; no task fails, broken sources degrade to placeholders.
//! [`Viewer::finish_load`] writes the settled results back and publishes the
//! finished asset atomically, unless a newer load has started in the
//! meantime.

use std::sync::Arc;

use anyhow::{Result, bail};
use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Transform as _, Vector3};
use futures::future::join_all;
use instant::Instant;

use crate::{
    camera::{CameraOptions, UserCamera},
    data_structures::{
        asset::{AlphaMode, Asset},
        image::{MimeType, Pixels},
    },
    envmap::add_environment_map,
    postprocess::{ImageProcessor, StandardImageProcessor},
    render::{DrawBackend, DrawPass, FrameCamera},
    resources::{
        BufferTask, DroppedFile, buffer_tasks, fetch_description, image::ImageTask,
        image::image_tasks, parse_description, resolve_provided_buffers,
    },
};

#[derive(Clone, Debug)]
pub struct ViewerOptions {
    /// Prefix joined onto relative asset paths and the environment folders.
    pub base_path: String,
    /// Environment folder name under `assets/images/`.
    pub environment: String,
    /// Highest specular mip index; faces exist for mips `0..=this`.
    pub environment_mip_count: u32,
    /// Load `.hdr` environment faces instead of `.jpg`.
    pub use_hdr: bool,
    /// Skip camera input interpolation (no windowing system present).
    pub headless: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            environment: "papermill".into(),
            environment_mip_count: 9,
            use_hdr: false,
            headless: false,
        }
    }
}

impl ViewerOptions {
    /// Join a description path onto the base path, leaving remote and
    /// absolute paths alone.
    pub fn resolve_path(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") || path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{}", self.base_path, path)
        }
    }
}

/// A load cycle between `begin_load` and `settle`: the materialized asset
/// plus every outstanding fetch task.
pub struct PendingLoad {
    generation: u64,
    asset: Asset,
    image_tasks: Vec<ImageTask>,
    buffer_tasks: Vec<BufferTask>,
}

impl PendingLoad {
    /// Await every buffer and image task jointly. Individual failures have
    /// already been converted to placeholder results by the tasks themselves,
    /// so this always completes.
    pub async fn settle(self) -> SettledLoad {
        let (images, buffers) = futures::join!(
            join_all(self.image_tasks.into_iter().map(ImageTask::settle)),
            join_all(self.buffer_tasks.into_iter().map(BufferTask::settle)),
        );
        SettledLoad {
            generation: self.generation,
            asset: self.asset,
            images,
            buffers,
        }
    }
}

/// All results of one load cycle, ready for synchronous write-back.
pub struct SettledLoad {
    generation: u64,
    asset: Asset,
    images: Vec<(usize, Pixels)>,
    buffers: Vec<(usize, Option<Vec<u8>>)>,
}

/// Owns the camera, the current asset and the draw backend, and runs the
/// load and frame cycles against them.
pub struct Viewer<B: DrawBackend> {
    pub backend: B,
    pub options: ViewerOptions,
    pub camera: UserCamera,
    current: Option<Arc<Asset>>,
    rendering: bool,
    loading: bool,
    loading_started: Option<Instant>,
    load_generation: u64,
    scene_index: isize,
    camera_index: Option<usize>,
    view_scale: f32,
    image_processor: Box<dyn ImageProcessor>,
    on_frame_ready: Option<Box<dyn FnMut()>>,
}

impl<B: DrawBackend> Viewer<B> {
    pub fn new(backend: B, options: ViewerOptions) -> Self {
        Self {
            backend,
            options,
            camera: UserCamera::new(),
            current: None,
            rendering: false,
            loading: false,
            loading_started: None,
            load_generation: 0,
            scene_index: 0,
            camera_index: None,
            view_scale: 1.0,
            image_processor: Box::new(StandardImageProcessor),
            on_frame_ready: None,
        }
    }

    /// The currently published asset, if any. Shared read-only; a new load
    /// replaces the whole `Arc`.
    pub fn current(&self) -> Option<&Arc<Asset>> {
        self.current.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Drive the loading indicator from outside the load cycle, so it also
    /// covers a description fetch that runs before `begin_load`.
    pub fn set_loading_indicator(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn scene_index(&self) -> isize {
        self.scene_index
    }

    /// Register a callback invoked after each rendered frame.
    pub fn on_frame_ready(&mut self, callback: impl FnMut() + 'static) {
        self.on_frame_ready = Some(Box::new(callback));
    }

    /// Reconfigure the user camera. Any asset-declared camera selection is
    /// dropped so the new configuration takes effect immediately.
    pub fn set_camera(&mut self, options: CameraOptions) {
        self.camera.apply_options(options);
        self.camera_index = None;
    }

    /// Select an asset-declared camera by index, or `None` for the user
    /// camera. Out-of-range indices fall back to the user camera at frame
    /// time.
    pub fn set_camera_index(&mut self, index: Option<usize>) {
        self.camera_index = index;
    }

    pub fn set_scene_index(&mut self, index: isize) {
        self.scene_index = index;
    }

    /// Step to the next scene; clamped during the frame walk.
    pub fn next_scene(&mut self) {
        self.scene_index += 1;
    }

    pub fn previous_scene(&mut self) {
        self.scene_index -= 1;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
        self.camera.resize(width, height);
    }

    /// Phase one of a load: validate, retire the previous asset and
    /// materialize the new one with its load tasks.
    ///
    /// A description without scenes is fatal and aborts here, before
    /// retirement, so the previously published asset stays up.
    pub fn begin_load(
        &mut self,
        path: &str,
        document: &gltf::Document,
        blob: Option<Vec<u8>>,
        files: Option<Vec<DroppedFile>>,
    ) -> Result<PendingLoad> {
        if document.scenes().len() == 0 {
            bail!("'{path}' declares no scenes");
        }

        self.loading = true;
        self.loading_started = Some(Instant::now());
        self.load_generation += 1;
        let generation = self.load_generation;
        log::info!("loading '{path}' (generation {generation})");

        // Retire the outgoing asset before its replacement starts allocating.
        self.rendering = false;
        self.backend.retire();
        self.current = None;

        let mut asset = Asset::from_document(path, generation, document, blob);

        let kind = if self.options.use_hdr {
            MimeType::Hdr
        } else {
            MimeType::Jpeg
        };
        if let Err(e) = add_environment_map(
            &mut asset,
            &self.options.base_path,
            &self.options.environment,
            self.options.environment_mip_count,
            kind,
        ) {
            // Environment config errors cost lighting, not the asset.
            log::error!("skipping environment map: {e:#}");
        }

        if let Some(files) = &files {
            resolve_provided_buffers(&mut asset, files);
        }
        let buffer_tasks = buffer_tasks(&asset);
        let image_tasks = image_tasks(&asset, files.as_deref());

        Ok(PendingLoad {
            generation,
            asset,
            image_tasks,
            buffer_tasks,
        })
    }

    /// Phase three of a load: write settled results into the asset, derive
    /// meshes and transforms, and publish. Results from a superseded load are
    /// discarded wholesale.
    pub fn finish_load(&mut self, settled: SettledLoad) -> Result<()> {
        if settled.generation != self.load_generation {
            log::info!(
                "discarding stale load results (generation {} superseded by {})",
                settled.generation,
                self.load_generation
            );
            return Ok(());
        }

        let mut asset = settled.asset;
        for (index, data) in settled.buffers {
            if let (Some(buffer), Some(data)) = (asset.buffers.get_mut(index), data) {
                buffer.set_data(data);
            }
        }
        for (index, pixels) in settled.images {
            if let Some(image) = asset.images.get_mut(index) {
                image.set_pixels(pixels);
            }
        }

        asset.build_meshes();
        self.image_processor.process_images(&mut asset);

        let scene = asset.scene.unwrap_or(0);
        for index in 0..asset.scenes.len() {
            asset.apply_transform_hierarchy(index);
        }
        self.view_scale = self.camera.fit_view_to_asset(&asset, scene);
        self.scene_index = scene as isize;

        self.current = Some(Arc::new(asset));
        self.rendering = true;
        self.loading = false;
        if let Some(started) = self.loading_started.take() {
            log::info!("load finished in {:?}", started.elapsed());
        }
        Ok(())
    }

    /// Run a complete load cycle on an already-parsed description.
    pub async fn create_asset(
        &mut self,
        path: &str,
        document: &gltf::Document,
        blob: Option<Vec<u8>>,
        files: Option<Vec<DroppedFile>>,
    ) -> Result<()> {
        let pending = self.begin_load(path, document, blob, files)?;
        let settled = pending.settle().await;
        self.finish_load(settled)
    }

    /// Fetch, parse and load a description by path, relative to the
    /// configured base path unless absolute or remote.
    pub async fn load_from_path(&mut self, path: &str) -> Result<()> {
        let full = self.options.resolve_path(path);

        self.loading = true;
        let result = match fetch_description(&full).await {
            Ok((document, blob)) => self.create_asset(&full, &document, blob, None).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.loading = false;
        }
        result
    }

    /// Load from a dropped file set: the description file plus any auxiliary
    /// buffers and images it references by name.
    pub async fn load_from_files(
        &mut self,
        main: DroppedFile,
        additional: Vec<DroppedFile>,
    ) -> Result<()> {
        let (document, blob) = parse_description(&main.name, &main.bytes)?;
        self.create_asset(&main.name, &document, blob, Some(additional))
            .await
    }

    /// Draw one frame of the current asset, if rendering is enabled.
    ///
    /// Clamps the scene selection, resolves the active camera, splits the
    /// scene into an opaque and a back-to-front sorted blended pass, and
    /// hands the plan to the backend. Draw errors are logged, not raised;
    /// the next frame retries.
    pub fn render_frame(&mut self) {
        if !self.rendering {
            return;
        }
        let Some(asset) = self.current.clone() else {
            return;
        };
        if asset.scenes.is_empty() {
            return;
        }

        let max_scene = asset.scenes.len() as isize - 1;
        self.scene_index = self.scene_index.clamp(0, max_scene);
        let scene = self.scene_index as usize;

        if !self.options.headless {
            self.camera.update_position();
        }
        let camera = self.resolve_camera(&asset);

        let blended = asset.nodes_with_alpha_mode(scene, AlphaMode::Blend, false);
        let passes = if blended.is_empty() {
            vec![DrawPass {
                nodes: asset.scene_mesh_nodes(scene),
                blended: false,
            }]
        } else {
            let opaque = asset.nodes_with_alpha_mode(scene, AlphaMode::Blend, true);
            let mut blended = blended;
            self.sort_back_to_front(&asset, &camera, &mut blended);
            vec![
                DrawPass {
                    nodes: opaque,
                    blended: false,
                },
                DrawPass {
                    nodes: blended,
                    blended: true,
                },
            ]
        };

        if let Err(e) = self
            .backend
            .render(&asset, &passes, &camera, self.view_scale)
        {
            log::error!("frame draw failed: {e:#}");
            return;
        }
        if let Some(callback) = &mut self.on_frame_ready {
            callback();
        }
    }

    /// The camera for this frame: an asset-declared one when selected and
    /// resolvable, otherwise the user's orbit camera.
    fn resolve_camera(&self, asset: &Asset) -> FrameCamera {
        if let Some(asset_camera) = self.camera_index.and_then(|index| asset.cameras.get(index)) {
            let node = asset_camera.node.and_then(|index| asset.nodes.get(index));
            let world = node
                .map(|node| node.world)
                .unwrap_or_else(Matrix4::identity);
            if let Some(view) = world.invert() {
                let projection = asset_camera
                    .projection
                    .matrix(self.camera.aspect_ratio, self.camera.zfar);
                let eye = world.transform_point(Point3::new(0.0, 0.0, 0.0));
                return FrameCamera {
                    view_proj: projection * view,
                    eye,
                };
            }
            log::warn!("asset camera transform is singular, using user camera");
        }
        FrameCamera {
            view_proj: self.camera.view_proj(),
            eye: self.camera.position,
        }
    }

    /// Order blended nodes by descending camera distance so farther surfaces
    /// composite first.
    fn sort_back_to_front(&self, asset: &Asset, camera: &FrameCamera, nodes: &mut [usize]) {
        let scale = self.view_scale;
        let eye = Vector3::new(camera.eye.x, camera.eye.y, camera.eye.z);
        let distance = |index: usize| -> f32 {
            let world = asset.nodes[index].world;
            let position = Vector3::new(world.w.x, world.w.y, world.w.z) * scale;
            (position - eye).magnitude2()
        };
        nodes.sort_by(|&a, &b| {
            distance(b)
                .partial_cmp(&distance(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}
