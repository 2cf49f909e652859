//! Application shell: window creation, event loop and input routing.
//!
//! Runs the [`Viewer`](crate::viewer::Viewer) behind a winit event loop. GPU
//! initialization and load settling are async; their results come back onto
//! the loop thread as user events so the viewer itself stays single-threaded.

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::{
    camera::CameraOptions,
    context::Context,
    render::GpuRenderer,
    resources::{DroppedFile, fetch_description, split_dropped},
    viewer::{SettledLoad, Viewer, ViewerOptions},
};

pub enum ViewerEvent {
    /// GPU context is up; carries the ready viewer. Only the wasm init path
    /// is async; natively the viewer is built by blocking on startup, which
    /// keeps this event type `Send` for the load futures.
    #[cfg(target_arch = "wasm32")]
    Initialized(Box<Viewer<GpuRenderer>>),
    /// A description fetch completed off-loop.
    Fetched {
        path: String,
        document: gltf::Document,
        blob: Option<Vec<u8>>,
        files: Option<Vec<DroppedFile>>,
    },
    /// All buffer and image tasks of a load settled.
    Settled(SettledLoad),
    /// A description fetch failed before a load cycle could begin.
    FetchFailed,
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    options: ViewerOptions,
    initial_model: Option<String>,
    viewer: Option<Viewer<GpuRenderer>>,
    pending_drop: Vec<DroppedFile>,
    rotating: bool,
}

impl App {
    fn new(
        event_loop: &EventLoop<ViewerEvent>,
        options: ViewerOptions,
        initial_model: Option<String>,
    ) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            runtime: tokio::runtime::Runtime::new().expect("tokio runtime"),
            proxy: event_loop.create_proxy(),
            options,
            initial_model,
            viewer: None,
            pending_drop: Vec::new(),
            rotating: false,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }

    #[cfg(target_arch = "wasm32")]
    fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        wasm_bindgen_futures::spawn_local(fut);
    }

    /// Fetch and parse a description off-loop; the parsed document comes back
    /// as [`ViewerEvent::Fetched`]. The loading indicator covers the fetch.
    fn request_load(&mut self, path: String) {
        if let Some(viewer) = &mut self.viewer {
            viewer.set_loading_indicator(true);
        }
        let proxy = self.proxy.clone();
        self.spawn(async move {
            match fetch_description(&path).await {
                Ok((document, blob)) => {
                    let _ = proxy.send_event(ViewerEvent::Fetched {
                        path,
                        document,
                        blob,
                        files: None,
                    });
                }
                Err(e) => {
                    log::error!("failed to fetch '{path}': {e:#}");
                    let _ = proxy.send_event(ViewerEvent::FetchFailed);
                }
            }
        });
    }

    /// Begin a load on the loop thread and settle it off-loop.
    fn begin_load(
        &mut self,
        path: &str,
        document: &gltf::Document,
        blob: Option<Vec<u8>>,
        files: Option<Vec<DroppedFile>>,
    ) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        match viewer.begin_load(path, document, blob, files) {
            Ok(pending) => {
                let proxy = self.proxy.clone();
                self.spawn(async move {
                    let _ = proxy.send_event(ViewerEvent::Settled(pending.settle().await));
                });
            }
            Err(e) => {
                log::error!("load rejected: {e:#}");
                viewer.set_loading_indicator(false);
            }
        }
    }

    fn window(&self) -> Option<&Arc<Window>> {
        self.viewer.as_ref().map(|viewer| &viewer.backend.ctx.window)
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes();

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let options = self.options.clone();
        let init_future = async move {
            let ctx = Context::new(window).await?;
            anyhow::Ok(Viewer::new(GpuRenderer::new(ctx), options))
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.runtime.block_on(init_future) {
                Ok(viewer) => {
                    let size = viewer.backend.ctx.window.inner_size();
                    self.viewer = Some(viewer);
                    if let Some(viewer) = &mut self.viewer {
                        viewer.resize(size.width, size.height);
                    }
                    if let Some(path) = self.initial_model.take() {
                        let full = self.options.resolve_path(&path);
                        self.request_load(full);
                    }
                }
                Err(e) => {
                    log::error!("GPU initialization failed: {e:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init_future.await {
                    Ok(viewer) => {
                        assert!(
                            proxy
                                .send_event(ViewerEvent::Initialized(Box::new(viewer)))
                                .is_ok()
                        );
                    }
                    Err(e) => log::error!("GPU initialization failed: {e:#}"),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            ViewerEvent::Initialized(viewer) => {
                self.viewer = Some(*viewer);
                if let Some(viewer) = &mut self.viewer {
                    let size = viewer.backend.ctx.window.inner_size();
                    viewer.resize(size.width, size.height);
                    viewer.backend.ctx.window.request_redraw();
                }
                if let Some(path) = self.initial_model.take() {
                    let full = self.options.resolve_path(&path);
                    self.request_load(full);
                }
            }
            ViewerEvent::Fetched {
                path,
                document,
                blob,
                files,
            } => self.begin_load(&path, &document, blob, files),
            ViewerEvent::Settled(settled) => {
                if let Some(viewer) = &mut self.viewer {
                    if let Err(e) = viewer.finish_load(settled) {
                        log::error!("failed to finish load: {e:#}");
                    }
                    viewer.backend.ctx.window.request_redraw();
                }
            }
            ViewerEvent::FetchFailed => {
                // The error was logged where it happened; the previous asset
                // stays published.
                if let Some(viewer) = &mut self.viewer {
                    viewer.set_loading_indicator(false);
                }
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.rotating {
                if let Some(viewer) = &mut self.viewer {
                    viewer.camera.rotate(dx, dy);
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(window) = self.window() {
                    window.request_redraw();
                }
                if let Some(viewer) = &mut self.viewer {
                    viewer.render_frame();
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y as f64 * 40.0,
                    MouseScrollDelta::PixelDelta(position) => -position.y,
                };
                if let Some(viewer) = &mut self.viewer {
                    viewer.camera.zoom(amount);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.rotating = state == ElementState::Pressed;
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                let Some(viewer) = &mut self.viewer else {
                    return;
                };
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::ArrowRight) => viewer.next_scene(),
                    PhysicalKey::Code(KeyCode::ArrowLeft) => viewer.previous_scene(),
                    PhysicalKey::Code(KeyCode::Home) => {
                        viewer.set_camera(CameraOptions::default());
                    }
                    _ => {}
                }
            }
            #[cfg(not(target_arch = "wasm32"))]
            WindowEvent::DroppedFile(path) => match std::fs::read(&path) {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.pending_drop.push(DroppedFile { name, bytes });
                }
                Err(e) => log::error!("failed to read dropped file {path:?}: {e}"),
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // A drop arrives as one event per file; the batch is complete once the
        // loop drains.
        if self.pending_drop.is_empty() {
            return;
        }
        let files = std::mem::take(&mut self.pending_drop);
        let Some((main, additional)) = split_dropped(files) else {
            return;
        };
        match crate::resources::parse_description(&main.name, &main.bytes) {
            Ok((document, blob)) => {
                self.begin_load(&main.name, &document, blob, Some(additional));
            }
            Err(e) => log::error!("failed to parse dropped '{}': {e:#}", main.name),
        }
    }
}

/// Initialize logging and run the viewer until the window closes.
pub fn run(options: ViewerOptions, initial_model: Option<String>) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, options, initial_model);
    event_loop.run_app(&mut app)?;

    Ok(())
}
