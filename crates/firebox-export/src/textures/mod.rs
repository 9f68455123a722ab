//! Image export
//!
//! Decides per registered image whether its source file can be copied or it
//! has to be encoded, and writes it through an [`ImageEncoder`].
//!
//! [`ImageEncoder`]: firebox_core::services::ImageEncoder

mod converter;
mod policy;

pub use converter::ImageFileEncoder;
pub use policy::{export_image, plan_image, ImagePlan};

use thiserror::Error;

/// Image writing errors
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

pub type TextureResult<T> = Result<T, TextureError>;
