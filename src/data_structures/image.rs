//! Image descriptors and decoded pixel payloads.
//!
//! An [`ImageDescriptor`] identifies where an image's bytes come from (an
//! external URI or a byte range inside one of the asset's buffers) and owns
//! the decoded result once the loader has settled. The descriptor is distinct
//! from the decoded payload so the whole asset graph can be materialized
//! before any pixel data exists.

use image::DynamicImage;

/// MIME type tag for an image source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MimeType {
    Jpeg,
    Png,
    Hdr,
}

impl MimeType {
    /// The file extension used by on-disk asset path conventions.
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Jpeg => ".jpg",
            MimeType::Png => ".png",
            MimeType::Hdr => ".hdr",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            MimeType::Jpeg => image::ImageFormat::Jpeg,
            MimeType::Png => image::ImageFormat::Png,
            MimeType::Hdr => image::ImageFormat::Hdr,
        }
    }

    /// Parse a declared MIME string such as `image/jpeg`. Unknown strings
    /// return `None` and the decoder will guess from the byte content.
    pub fn from_declared(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(MimeType::Jpeg),
            "image/png" => Some(MimeType::Png),
            "image/vnd.radiance" => Some(MimeType::Hdr),
            _ => None,
        }
    }
}

/// One face of a cube map, in the fixed +X,-X,+Y,-Y,+Z,-Z order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ORDER: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// The name used in environment-map file paths.
    pub fn file_name(&self) -> &'static str {
        match self {
            CubeFace::PositiveX => "right",
            CubeFace::NegativeX => "left",
            CubeFace::PositiveY => "top",
            CubeFace::NegativeY => "bottom",
            CubeFace::PositiveZ => "front",
            CubeFace::NegativeZ => "back",
        }
    }
}

/// A settled pixel payload. Decode failures degrade to [`Pixels::Placeholder`]
/// so downstream code never has to handle an unpopulated slot.
#[derive(Clone, Debug)]
pub enum Pixels {
    Decoded(DynamicImage),
    Placeholder,
}

impl Pixels {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Pixels::Placeholder)
    }
}

/// Identifies one image's pixel source and owns the decoded handle.
///
/// Exactly one of `uri` / `buffer_view` is set for descriptors that require
/// loading. `face` and `mip_level` are only populated for environment-map
/// images.
#[derive(Clone, Debug)]
pub struct ImageDescriptor {
    pub uri: Option<String>,
    pub buffer_view: Option<usize>,
    pub mime_type: Option<MimeType>,
    pub face: Option<CubeFace>,
    pub mip_level: u32,
    pixels: Option<Pixels>,
}

impl ImageDescriptor {
    pub fn from_uri(uri: impl Into<String>, mime_type: Option<MimeType>) -> Self {
        Self {
            uri: Some(uri.into()),
            buffer_view: None,
            mime_type,
            face: None,
            mip_level: 0,
            pixels: None,
        }
    }

    pub fn from_buffer_view(view: usize, mime_type: Option<MimeType>) -> Self {
        Self {
            uri: None,
            buffer_view: Some(view),
            mime_type,
            face: None,
            mip_level: 0,
            pixels: None,
        }
    }

    pub fn with_face(mut self, face: CubeFace, mip_level: u32) -> Self {
        self.face = Some(face);
        self.mip_level = mip_level;
        self
    }

    pub fn pixels(&self) -> Option<&Pixels> {
        self.pixels.as_ref()
    }

    pub fn pixels_mut(&mut self) -> Option<&mut Pixels> {
        self.pixels.as_mut()
    }

    pub fn is_loaded(&self) -> bool {
        self.pixels.is_some()
    }

    /// Write-once hand-off of the decoded result. A second write for the same
    /// descriptor is a stale or duplicated task and is dropped.
    pub fn set_pixels(&mut self, pixels: Pixels) {
        if self.pixels.is_some() {
            log::warn!("discarding duplicate pixel result for {:?}", self.uri);
            return;
        }
        self.pixels = Some(pixels);
    }
}
