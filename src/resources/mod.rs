//! Byte acquisition from the three input origins: remote URIs, the local
//! filesystem, and user-dropped files, plus the top-level description fetch.
//!
//! All loads are async and cooperative; on wasm everything goes through
//! `reqwest` relative to the page origin, natively `http(s)` URIs are fetched
//! and anything else is read from disk.

use std::io::Cursor;

use anyhow::{Context as _, Result};

use crate::data_structures::asset::Asset;

pub mod image;

/// A file handed over by the platform's drag-and-drop surface.
#[derive(Clone, Debug)]
pub struct DroppedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub fn is_glb(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".glb")
}

pub fn is_gltf(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".gltf")
}

/// Split a dropped file set into the primary description file and the
/// auxiliary files (extra buffers and images). `None` if no description file
/// was part of the drop.
pub fn split_dropped(files: Vec<DroppedFile>) -> Option<(DroppedFile, Vec<DroppedFile>)> {
    let mut main = None;
    let mut additional = Vec::new();
    for file in files {
        if main.is_none() && (is_gltf(&file.name) || is_glb(&file.name)) {
            main = Some(file);
        } else {
            additional.push(file);
        }
    }
    match main {
        Some(main) => Some((main, additional)),
        None => {
            log::warn!(
                "no gltf/glb file in drop, got: {}",
                additional
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            None
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> Result<reqwest::Url> {
    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .ok()
        .context("no window origin")?;
    let base = reqwest::Url::parse(&format!("{}/", origin))?;
    Ok(base.join(file_name)?)
}

pub async fn load_binary(path: &str) -> Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(path)?;
        reqwest::get(url).await?.error_for_status()?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        if path.starts_with("http://") || path.starts_with("https://") {
            reqwest::get(path)
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec()
        } else {
            std::fs::read(path).with_context(|| format!("reading '{path}'"))?
        }
    };

    Ok(data)
}

/// Fetch and parse a top-level asset description. Container kind follows the
/// file-extension convention: `.glb` is handed to the binary extractor, which
/// yields the JSON-equivalent document plus the embedded buffer blob;
/// anything else is parsed as JSON text.
pub async fn fetch_description(path: &str) -> Result<(gltf::Document, Option<Vec<u8>>)> {
    let bytes = load_binary(path).await?;
    parse_description(path, &bytes)
}

pub fn parse_description(path: &str, bytes: &[u8]) -> Result<(gltf::Document, Option<Vec<u8>>)> {
    let gltf = if is_glb(path) {
        gltf::Gltf::from_slice(bytes)
    } else {
        gltf::Gltf::from_reader(Cursor::new(bytes))
    }
    .with_context(|| format!("parsing '{path}'"))?;
    Ok((gltf.document, gltf.blob))
}

/// Origin of one buffer's bytes, resolved at task creation.
#[derive(Debug)]
enum BufferSource {
    Remote(String),
    Missing,
}

/// One independent buffer fetch. Settles to `None` on failure; the dependent
/// meshes then come out empty instead of aborting the load cycle.
#[derive(Debug)]
pub struct BufferTask {
    pub index: usize,
    source: BufferSource,
}

impl BufferTask {
    pub async fn settle(self) -> (usize, Option<Vec<u8>>) {
        match self.source {
            BufferSource::Remote(uri) => match load_binary(&uri).await {
                Ok(bytes) => (self.index, Some(bytes)),
                Err(e) => {
                    log::error!("failed to load buffer '{uri}': {e:#}");
                    (self.index, None)
                }
            },
            BufferSource::Missing => (self.index, None),
        }
    }
}

/// Fill buffers whose URI matches a dropped file by name. Runs synchronously
/// before task creation so embedded images can snapshot their byte ranges.
pub fn resolve_provided_buffers(asset: &mut Asset, files: &[DroppedFile]) {
    for buffer in &mut asset.buffers {
        if buffer.data().is_some() {
            continue;
        }
        let Some(uri) = buffer.uri.clone() else {
            continue;
        };
        if let Some(file) = files.iter().find(|file| file.name == uri) {
            buffer.set_data(file.bytes.clone());
        }
    }
}

/// Create one fetch task per buffer that still has no data.
pub fn buffer_tasks(asset: &Asset) -> Vec<BufferTask> {
    asset
        .buffers
        .iter()
        .enumerate()
        .filter(|(_, buffer)| buffer.data().is_none())
        .map(|(index, buffer)| BufferTask {
            index,
            source: match &buffer.uri {
                Some(uri) => BufferSource::Remote(uri.clone()),
                None => {
                    log::warn!("buffer {index} has neither data nor a uri");
                    BufferSource::Missing
                }
            },
        })
        .collect()
}
