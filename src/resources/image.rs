//! The image loader: multi-source pixel acquisition with a no-throw
//! completion contract.
//!
//! [`load_task`] resolves a descriptor's origin into an [`ImageTask`] that
//! owns everything it needs; [`ImageTask::settle`] then fetches and decodes.
//! Both success and failure settle the task normally: a broken source
//! degrades to [`Pixels::Placeholder`] so the orchestrator's joint wait
//! always terminates.

use crate::{
    data_structures::{
        asset::Asset,
        image::{ImageDescriptor, MimeType, Pixels},
    },
    resources::{DroppedFile, load_binary},
};

/// The resolved byte origin for one image, snapshotted at task creation.
#[derive(Debug)]
enum PixelSource {
    Remote(String),
    Bytes(Vec<u8>),
    Missing,
}

/// One independent, never-failing image load.
#[derive(Debug)]
pub struct ImageTask {
    pub index: usize,
    source: PixelSource,
    mime_type: Option<MimeType>,
}

impl ImageTask {
    pub async fn settle(self) -> (usize, Pixels) {
        let pixels = match self.source {
            PixelSource::Remote(uri) => match load_binary(&uri).await {
                Ok(bytes) => decode(&bytes, self.mime_type, &uri),
                Err(e) => {
                    log::warn!("failed to fetch image '{uri}': {e:#}");
                    Pixels::Placeholder
                }
            },
            PixelSource::Bytes(bytes) => decode(&bytes, self.mime_type, "embedded image"),
            PixelSource::Missing => Pixels::Placeholder,
        };
        (self.index, pixels)
    }
}

/// Resolve one descriptor into a load task, or `None` when its pixels are
/// already populated (idempotent load: the decode runs at most once).
///
/// Origin precedence: an explicit URI wins; otherwise the buffer-view
/// reference is resolved against the asset's buffer tables into an owned byte
/// range. When a dropped-file set is supplied, a file whose name equals the
/// URI short-circuits the fetch; a miss falls back to treating the URI as a
/// normal external reference.
pub fn load_task(
    index: usize,
    image: &ImageDescriptor,
    asset: &Asset,
    files: Option<&[DroppedFile]>,
) -> Option<ImageTask> {
    if image.is_loaded() {
        return None;
    }

    let source = if let Some(uri) = &image.uri {
        let dropped = files.and_then(|files| files.iter().find(|file| file.name == *uri));
        match dropped {
            Some(file) => PixelSource::Bytes(file.bytes.clone()),
            None => PixelSource::Remote(uri.clone()),
        }
    } else if let Some(view) = image.buffer_view {
        match asset.resolve_view(view) {
            Some(bytes) => PixelSource::Bytes(bytes),
            None => {
                log::warn!("image {index} references unresolved buffer view {view}");
                PixelSource::Missing
            }
        }
    } else {
        log::warn!("image {index} has neither a uri nor a buffer view");
        PixelSource::Missing
    };

    Some(ImageTask {
        index,
        source,
        mime_type: image.mime_type,
    })
}

/// Create load tasks for every descriptor in the asset that still needs one.
pub fn image_tasks(asset: &Asset, files: Option<&[DroppedFile]>) -> Vec<ImageTask> {
    asset
        .images
        .iter()
        .enumerate()
        .filter_map(|(index, image)| load_task(index, image, asset, files))
        .collect()
}

fn decode(bytes: &[u8], mime_type: Option<MimeType>, label: &str) -> Pixels {
    let decoded = match mime_type {
        Some(mime) => image::load_from_memory_with_format(bytes, mime.image_format())
            .or_else(|_| image::load_from_memory(bytes)),
        None => image::load_from_memory(bytes),
    };
    match decoded {
        Ok(img) => Pixels::Decoded(img),
        Err(e) => {
            log::warn!("failed to decode {label}: {e}");
            Pixels::Placeholder
        }
    }
}
