//! Image loading behind a small trait so callers can supply their own source.

use camcal_core::GrayImage;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ImageLoadError {
    #[error("{path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("{path}: image has zero size")]
    Empty { path: String },
}

/// Produces 8-bit grayscale images from paths.
pub trait ImageLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<GrayImage, ImageLoadError>;
}

/// Decodes files with the `image` crate and converts them to luma.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsImageLoader;

impl ImageLoader for FsImageLoader {
    fn load(&self, path: &Path) -> Result<GrayImage, ImageLoadError> {
        let decoded = image::open(path).map_err(|source| ImageLoadError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        let luma = decoded.to_luma8();
        let (w, h) = luma.dimensions();
        if w == 0 || h == 0 {
            return Err(ImageLoadError::Empty {
                path: path.display().to_string(),
            });
        }
        GrayImage::from_raw(w as usize, h as usize, luma.into_raw()).ok_or_else(|| {
            ImageLoadError::Empty {
                path: path.display().to_string(),
            }
        })
    }
}

/// Encode `img` as an 8-bit grayscale PNG.
pub fn save_png(img: &GrayImage, path: &Path) -> Result<(), image::ImageError> {
    image::save_buffer(
        path,
        &img.data,
        img.width as u32,
        img.height as u32,
        image::ExtendedColorType::L8,
    )
}
