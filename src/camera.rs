//! User camera, projection math and view fitting.
//!
//! The viewer always owns one [`UserCamera`] driven by mouse input. Assets may
//! additionally declare their own cameras; those are carried as
//! [`AssetProjection`] values and selected by index at frame time.

use cgmath::{
    Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector3, perspective, ortho,
};

use crate::data_structures::asset::Asset;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    Orthographic,
}

/// Recognized camera configuration options, each independently defaulted.
#[derive(Clone, Debug)]
pub struct CameraOptions {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub kind: ProjectionKind,
    pub znear: f32,
    pub zfar: f32,
    pub yfov: Rad<f32>,
    pub aspect_ratio: f32,
    pub xmag: f32,
    pub ymag: f32,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            eye: Point3::new(0.0, 0.0, 0.05),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
            kind: ProjectionKind::Perspective,
            znear: 0.01,
            zfar: 10000.0,
            yfov: Deg(45.0).into(),
            aspect_ratio: 16.0 / 9.0,
            xmag: 1.0,
            ymag: 1.0,
        }
    }
}

/// A projection declared by the asset itself. Omitted values fall back to the
/// user camera's state at frame time.
#[derive(Clone, Debug)]
pub enum AssetProjection {
    Perspective {
        yfov: Rad<f32>,
        znear: f32,
        zfar: Option<f32>,
        aspect_ratio: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

impl AssetProjection {
    pub fn matrix(&self, fallback_aspect: f32, fallback_zfar: f32) -> Matrix4<f32> {
        match *self {
            AssetProjection::Perspective {
                yfov,
                znear,
                zfar,
                aspect_ratio,
            } => {
                let aspect = aspect_ratio.unwrap_or(fallback_aspect);
                let zfar = zfar.unwrap_or(fallback_zfar);
                OPENGL_TO_WGPU_MATRIX * perspective(yfov, aspect, znear, zfar)
            }
            AssetProjection::Orthographic {
                xmag,
                ymag,
                znear,
                zfar,
            } => OPENGL_TO_WGPU_MATRIX * ortho(-xmag, xmag, -ymag, ymag, znear, zfar),
        }
    }
}

/// The mouse-controlled orbit camera.
#[derive(Debug)]
pub struct UserCamera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub kind: ProjectionKind,
    pub znear: f32,
    pub zfar: f32,
    pub yfov: Rad<f32>,
    pub aspect_ratio: f32,
    pub xmag: f32,
    pub ymag: f32,
    // pending input, applied on the next `update_position`
    pending_yaw: f32,
    pending_pitch: f32,
    pending_zoom: f32,
}

impl UserCamera {
    const ROTATE_SPEED: f32 = 0.005;
    const ZOOM_SPEED: f32 = 0.001;

    pub fn new() -> Self {
        let mut camera = Self {
            position: Point3::new(0.0, 0.0, 0.05),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
            kind: ProjectionKind::Perspective,
            znear: 0.01,
            zfar: 10000.0,
            yfov: Deg(45.0).into(),
            aspect_ratio: 16.0 / 9.0,
            xmag: 1.0,
            ymag: 1.0,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            pending_zoom: 0.0,
        };
        camera.apply_options(CameraOptions::default());
        camera
    }

    pub fn apply_options(&mut self, options: CameraOptions) {
        self.position = options.eye;
        self.target = options.target;
        self.up = options.up;
        self.kind = options.kind;
        self.znear = options.znear;
        self.zfar = options.zfar;
        self.yfov = options.yfov;
        self.aspect_ratio = options.aspect_ratio;
        self.xmag = options.xmag;
        self.ymag = options.ymag;
    }

    /// Queue an orbit rotation from a mouse drag delta (in pixels).
    pub fn rotate(&mut self, dx: f64, dy: f64) {
        self.pending_yaw += dx as f32 * Self::ROTATE_SPEED;
        self.pending_pitch += dy as f32 * Self::ROTATE_SPEED;
    }

    /// Queue a zoom from a wheel delta.
    pub fn zoom(&mut self, delta: f64) {
        self.pending_zoom += delta as f32 * Self::ZOOM_SPEED;
    }

    /// Advance the camera interpolation: apply queued orbit and zoom input.
    /// Skipped entirely in headless mode.
    pub fn update_position(&mut self) {
        let mut offset = self.position - self.target;
        let radius = offset.magnitude();
        if radius <= f32::EPSILON {
            return;
        }

        if self.pending_yaw != 0.0 || self.pending_pitch != 0.0 {
            let yaw = Matrix4::from_axis_angle(self.up, Rad(-self.pending_yaw));
            let right = offset.cross(self.up);
            // At the poles the view direction is parallel to `up` and the
            // pitch axis degenerates; only the yaw applies there.
            offset = if right.magnitude2() > f32::EPSILON {
                let pitch = Matrix4::from_axis_angle(right.normalize(), Rad(-self.pending_pitch));
                (yaw * pitch * offset.extend(0.0)).truncate()
            } else {
                (yaw * offset.extend(0.0)).truncate()
            };
        }

        let zoomed = (offset.magnitude() * (1.0 + self.pending_zoom)).max(self.znear * 2.0);
        offset = offset.normalize() * zoomed;

        self.position = self.target + offset;
        self.pending_yaw = 0.0;
        self.pending_pitch = 0.0;
        self.pending_zoom = 0.0;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        match self.kind {
            ProjectionKind::Perspective => {
                OPENGL_TO_WGPU_MATRIX
                    * perspective(self.yfov, self.aspect_ratio, self.znear, self.zfar)
            }
            ProjectionKind::Orthographic => {
                OPENGL_TO_WGPU_MATRIX
                    * ortho(
                        -self.xmag,
                        self.xmag,
                        -self.ymag,
                        self.ymag,
                        self.znear,
                        self.zfar,
                    )
            }
        }
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Frame the scene: derive a draw scale that normalizes the scene's
    /// longest world-space extent to roughly one unit, and aim the camera at
    /// the scaled center. Returns the scale factor the renderer applies.
    pub fn fit_view_to_asset(&mut self, asset: &Asset, scene_index: usize) -> f32 {
        let Some((min, max)) = asset.bounding_box(scene_index) else {
            return 1.0;
        };
        let extent = max - min;
        let longest = extent.x.max(extent.y).max(extent.z);
        let scale = if longest > f32::EPSILON {
            1.0 / longest
        } else {
            1.0
        };

        let center = Point3::midpoint(Point3::from_vec(min), Point3::from_vec(max)) * scale;
        let distance = 0.5 / (self.yfov.0 * 0.5).tan() * 1.6;

        self.target = center;
        self.position = center + Vector3::new(0.0, 0.0, distance);
        scale
    }
}
