//! Post-processing over a fully settled image table.
//!
//! Runs after the joint wait, so every slot is populated (possibly with a
//! placeholder). The pass must never fail the load because of an individual
//! placeholder.

use image::DynamicImage;

use crate::data_structures::{asset::Asset, image::Pixels};

/// A pass over the asset's loaded image table, producing derived data before
/// publish.
pub trait ImageProcessor {
    fn process_images(&self, asset: &mut Asset);
}

/// Normalizes decoded images to RGBA8 ahead of GPU upload, so texture
/// creation never has to branch on the source pixel layout. HDR sources keep
/// their float data. Placeholders pass through untouched.
pub struct StandardImageProcessor;

impl ImageProcessor for StandardImageProcessor {
    fn process_images(&self, asset: &mut Asset) {
        let mut placeholders = 0usize;
        for image in &mut asset.images {
            match image.pixels_mut() {
                Some(Pixels::Decoded(img)) => {
                    if !matches!(img, DynamicImage::ImageRgba8(_) | DynamicImage::ImageRgb32F(_)) {
                        *img = DynamicImage::ImageRgba8(img.to_rgba8());
                    }
                }
                Some(Pixels::Placeholder) => placeholders += 1,
                None => {
                    // The joint wait guarantees this never happens.
                    log::error!("image slot unset after load settled");
                }
            }
        }
        if placeholders > 0 {
            log::warn!(
                "{placeholders} of {} images failed to load and use placeholders",
                asset.images.len()
            );
        }
    }
}
