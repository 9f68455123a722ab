//! Copy-or-encode decision for registered images

use std::path::{Path, PathBuf};

use firebox_core::config::{ExportConfig, TextureFormat};
use firebox_core::services::{ImageEncodeOptions, ImageEncoder};
use firebox_core::{Error, Result};
use tracing::debug;

use crate::registry::{AssetImage, ImageOrigin};

/// Extensions that can be referenced by the room without re-encoding
const COPYABLE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// How one image reaches the export root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePlan {
    /// Copy the source file, keeping its extension
    Copy { source: PathBuf, extension: String },
    /// Encode pixels to the given format
    Encode { format: TextureFormat, keep_alpha: bool },
}

impl ImagePlan {
    /// Extension the exported file ends up with
    pub fn extension(&self) -> &str {
        match self {
            ImagePlan::Copy { extension, .. } => extension,
            ImagePlan::Encode { format, .. } => format.extension(),
        }
    }
}

/// Decide how `image` is exported
///
/// Alpha is kept when the host marks the image as transparent or a
/// transparent material uses it; formats without alpha then fall back to PNG.
/// Lightmap atlases are always copied.
pub fn plan_image(image: &AssetImage, config: &ExportConfig) -> ImagePlan {
    let source = match &image.origin {
        ImageOrigin::Lightmap(atlas) => {
            return ImagePlan::Copy {
                source: atlas.path.clone(),
                extension: atlas.source_extension(),
            }
        }
        ImageOrigin::Source(source) => Some(source),
        ImageOrigin::Generated(_) => None,
    };

    let keep_alpha = image.export_alpha || source.is_some_and(|s| s.alpha_is_transparency);
    let format = if keep_alpha && !config.texture_format.supports_alpha() {
        TextureFormat::Png
    } else {
        config.texture_format
    };

    if let Some(source) = source.filter(|_| !config.force_retranscode) {
        if let (Some(path), Some(extension)) = (&source.path, source.source_extension()) {
            let copyable = COPYABLE_EXTENSIONS.contains(&extension.as_str());
            // a JPEG cannot carry the alpha the room needs
            if copyable && (!keep_alpha || extension == ".png") {
                return ImagePlan::Copy {
                    source: path.clone(),
                    extension,
                };
            }
        }
    }

    ImagePlan::Encode { format, keep_alpha }
}

/// Write one image into `root` and resolve its exported name
///
/// In html-only runs nothing is written; the name is resolved from the plan
/// alone so it matches what a full run wrote.
pub fn export_image(
    image: &mut AssetImage,
    config: &ExportConfig,
    encoder: &mut dyn ImageEncoder,
    root: &Path,
) -> Result<()> {
    let plan = plan_image(image, config);
    let extension = plan.extension().to_string();

    if !config.html_only {
        let destination = root.join(format!("{}{}", image.src, extension));
        match &plan {
            ImagePlan::Copy { source, .. } => encoder.copy(source, &destination)?,
            ImagePlan::Encode { format, keep_alpha } => {
                let pixels = match &image.origin {
                    ImageOrigin::Generated(Some(pixels)) => pixels.clone(),
                    ImageOrigin::Generated(None) => {
                        return Err(Error::encoding(&image.id, "image was not rendered"));
                    }
                    ImageOrigin::Source(source) => source.load_pixels()?,
                    ImageOrigin::Lightmap(atlas) => {
                        return Err(Error::encoding(&image.id, format!("atlas {} cannot be encoded", atlas.index)));
                    }
                };
                let options = ImageEncodeOptions {
                    format: *format,
                    quality: config.texture_quality,
                    keep_alpha: *keep_alpha,
                };
                encoder.encode(&pixels, &options, &destination)?;
            }
        }
        debug!(image = %image.id, path = %destination.display(), "exported image");
    }

    image.resolve(&extension);
    Ok(())
}
