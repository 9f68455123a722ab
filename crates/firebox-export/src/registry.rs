//! Asset registry
//!
//! Identity-keyed stores for every image and mesh the export produces. Entries
//! are kept in registration order, which is also the order they are written
//! to the room document.

use std::sync::Arc;

use firebox_core::scene::{ImageSource, LightmapAtlas, Material};
use firebox_core::services::MeshData;
use firebox_core::types::Color;
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Side length of the flat images synthesized for material colors
pub const GENERATED_COLOR_SIZE: u32 = 2;

/// Where an image's pixels come from
#[derive(Debug, Clone)]
pub enum ImageOrigin {
    /// Image owned by the host scene
    Source(Arc<ImageSource>),
    /// Lightmap atlas copied verbatim
    Lightmap(Arc<LightmapAtlas>),
    /// Produced by this pipeline; `None` when the pixels were not rendered
    /// (html-only runs)
    Generated(Option<RgbaImage>),
}

/// An image declared in the room document
#[derive(Debug, Clone)]
pub struct AssetImage {
    /// Unique within the document
    pub id: String,
    /// Output file name without extension
    pub src: String,
    pub origin: ImageOrigin,
    /// Produced by the pipeline rather than taken from a source file
    pub is_generated: bool,
    /// Keep the alpha channel (forces an alpha-capable format)
    pub export_alpha: bool,
    /// `src` plus the resolved extension, set once the file is written
    pub exported_src: Option<String>,
}

impl AssetImage {
    /// Append the resolved extension; later calls are ignored
    pub fn resolve(&mut self, extension: &str) {
        if self.exported_src.is_none() {
            self.exported_src = Some(format!("{}{}", self.src, extension));
        }
    }

    pub fn source(&self) -> Option<&Arc<ImageSource>> {
        match &self.origin {
            ImageOrigin::Source(source) => Some(source),
            _ => None,
        }
    }
}

/// Merge key of an exported mesh
#[derive(Debug, Clone)]
pub enum GroupKey {
    /// One scene object, by walk order
    Object(usize),
    /// Every lightmapped object sharing an atlas
    Lightmap(i32),
    /// Every object sharing a material and an atlas
    Material { material: Arc<Material>, lightmap: i32 },
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GroupKey::Object(a), GroupKey::Object(b)) => a == b,
            (GroupKey::Lightmap(a), GroupKey::Lightmap(b)) => a == b,
            (
                GroupKey::Material { material: a, lightmap: la },
                GroupKey::Material { material: b, lightmap: lb },
            ) => Arc::ptr_eq(a, b) && la == lb,
            _ => false,
        }
    }
}

impl Eq for GroupKey {}

/// A merged mesh declared in the room document
#[derive(Debug, Clone)]
pub struct AssetMesh {
    pub id: String,
    pub key: GroupKey,
    /// Merged geometry, absent until the group was built
    pub geometry: Option<MeshData>,
    /// Output file name with extension, set once the file is written
    pub src: Option<String>,
}

/// Registry of all assets of one export session
#[derive(Debug, Default)]
pub struct AssetRegistry {
    images: Vec<AssetImage>,
    meshes: Vec<AssetMesh>,
    generated_colors: Vec<([u8; 4], usize)>,
    color_counter: usize,
    unnamed_meshes: usize,
    unnamed_images: usize,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Images =====

    /// Register a host image; the same image (name and `Arc`) is registered once
    pub fn register_image(&mut self, source: &Arc<ImageSource>) -> &mut AssetImage {
        let existing = self.images.iter().position(|img| match &img.origin {
            ImageOrigin::Source(s) => s.name == source.name && Arc::ptr_eq(s, source),
            _ => false,
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let id = self.unique_image_id(&source.name);
                debug!(id = %id, "registered image");
                self.push_image(AssetImage {
                    src: id.clone(),
                    id,
                    origin: ImageOrigin::Source(Arc::clone(source)),
                    is_generated: false,
                    export_alpha: false,
                    exported_src: None,
                })
            }
        };
        &mut self.images[index]
    }

    /// Register a lightmap atlas that is copied without re-encoding
    pub fn register_lightmap_file(&mut self, atlas: &Arc<LightmapAtlas>, name: &str) -> &mut AssetImage {
        let existing = self.images.iter().position(|img| match &img.origin {
            ImageOrigin::Lightmap(a) => Arc::ptr_eq(a, atlas),
            _ => false,
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let id = self.unique_image_id(name);
                self.push_image(AssetImage {
                    src: id.clone(),
                    id,
                    origin: ImageOrigin::Lightmap(Arc::clone(atlas)),
                    is_generated: false,
                    export_alpha: false,
                    exported_src: None,
                })
            }
        };
        &mut self.images[index]
    }

    /// Register an image produced by the pipeline, keyed by name
    ///
    /// Registering a name again replaces the pixels of the existing entry.
    pub fn register_generated_image(&mut self, name: &str, pixels: Option<RgbaImage>) -> &mut AssetImage {
        let existing = self
            .images
            .iter()
            .position(|img| img.is_generated && img.id == name);
        let index = match existing {
            Some(index) => {
                if pixels.is_some() {
                    self.images[index].origin = ImageOrigin::Generated(pixels);
                }
                index
            }
            None => {
                let id = self.unique_image_id(name);
                self.push_image(AssetImage {
                    src: id.clone(),
                    id,
                    origin: ImageOrigin::Generated(pixels),
                    is_generated: true,
                    export_alpha: false,
                    exported_src: None,
                })
            }
        };
        &mut self.images[index]
    }

    /// Register a flat 2x2 image for a material color
    ///
    /// Names are `GeneratedColor<N>` with `N` counting up per registry; the
    /// same 8-bit color maps to the same image.
    pub fn register_generated_color_image(&mut self, color: Color) -> &mut AssetImage {
        let rgba = color.to_rgba8();
        if let Some(&(_, index)) = self.generated_colors.iter().find(|(c, _)| *c == rgba) {
            return &mut self.images[index];
        }

        self.color_counter += 1;
        let name = format!("GeneratedColor{}", self.color_counter);
        let pixels = RgbaImage::from_pixel(GENERATED_COLOR_SIZE, GENERATED_COLOR_SIZE, Rgba(rgba));
        let id = self.unique_image_id(&name);
        let index = self.push_image(AssetImage {
            src: id.clone(),
            id,
            origin: ImageOrigin::Generated(Some(pixels)),
            is_generated: true,
            export_alpha: false,
            exported_src: None,
        });
        self.generated_colors.push((rgba, index));
        &mut self.images[index]
    }

    pub fn images(&self) -> &[AssetImage] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [AssetImage] {
        &mut self.images
    }

    pub fn image(&self, id: &str) -> Option<&AssetImage> {
        self.images.iter().find(|img| img.id == id)
    }

    pub fn image_mut(&mut self, id: &str) -> Option<&mut AssetImage> {
        self.images.iter_mut().find(|img| img.id == id)
    }

    fn push_image(&mut self, image: AssetImage) -> usize {
        self.images.push(image);
        self.images.len() - 1
    }

    /// Empty names become `ExportedImage<n>`
    fn unique_image_id(&mut self, name: &str) -> String {
        let base = if name.is_empty() {
            self.unnamed_images += 1;
            format!("ExportedImage{}", self.unnamed_images)
        } else {
            name.to_string()
        };
        unique_name(&base, |candidate| self.images.iter().any(|img| img.id == candidate))
    }

    // ===== Meshes =====

    /// Register the mesh of a merge group
    ///
    /// `name` is only used when the key is new; empty names become
    /// `ExportedMesh<n>` and colliding names get a `_<n>` suffix.
    pub fn register_mesh(&mut self, key: GroupKey, name: &str) -> &mut AssetMesh {
        if let Some(index) = self.meshes.iter().position(|m| m.key == key) {
            return &mut self.meshes[index];
        }

        let base = if name.is_empty() {
            self.unnamed_meshes += 1;
            format!("ExportedMesh{}", self.unnamed_meshes)
        } else {
            name.to_string()
        };
        let id = unique_name(&base, |candidate| self.meshes.iter().any(|m| m.id == candidate));
        debug!(id = %id, "registered mesh");

        self.meshes.push(AssetMesh {
            id,
            key,
            geometry: None,
            src: None,
        });
        let last = self.meshes.len() - 1;
        &mut self.meshes[last]
    }

    pub fn meshes(&self) -> &[AssetMesh] {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut [AssetMesh] {
        &mut self.meshes
    }

    pub fn mesh(&self, id: &str) -> Option<&AssetMesh> {
        self.meshes.iter().find(|m| m.id == id)
    }

}

/// `base`, or `base_<n>` for the smallest `n` not taken
fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use firebox_core::scene::Shader;

    fn image(name: &str) -> Arc<ImageSource> {
        Arc::new(ImageSource::from_file(name, format!("{}.png", name)))
    }

    #[test]
    fn test_register_image_dedups_by_identity() {
        let mut registry = AssetRegistry::new();
        let brick = image("Brick");

        let first = registry.register_image(&brick).id.clone();
        let second = registry.register_image(&brick).id.clone();

        assert_eq!(first, "Brick");
        assert_eq!(first, second);
        assert_eq!(registry.images().len(), 1);
    }

    #[test]
    fn test_same_name_different_image_gets_suffix() {
        let mut registry = AssetRegistry::new();
        let a = registry.register_image(&image("Brick")).id.clone();
        let b = registry.register_image(&image("Brick")).id.clone();

        assert_eq!(a, "Brick");
        assert_eq!(b, "Brick_1");
        assert_eq!(registry.image("Brick_1").map(|i| i.src.as_str()), Some("Brick_1"));
    }

    #[test]
    fn test_unnamed_images_get_generated_ids() {
        let mut registry = AssetRegistry::new();
        let first = Arc::new(ImageSource::from_pixels("", RgbaImage::new(2, 2)));
        let second = Arc::new(ImageSource::from_pixels("", RgbaImage::new(2, 2)));

        let a = registry.register_image(&first).id.clone();
        let again = registry.register_image(&first).id.clone();
        let b = registry.register_image(&second).id.clone();
        let generated = registry.register_generated_image("", None).id.clone();

        assert_eq!(a, "ExportedImage1");
        assert_eq!(again, a);
        assert_eq!(b, "ExportedImage2");
        assert_eq!(generated, "ExportedImage3");
        assert!(registry.images().iter().all(|img| !img.src.is_empty()));
    }

    #[test]
    fn test_generated_colors_count_up() {
        let mut registry = AssetRegistry::new();
        let red = registry.register_generated_color_image(Color::rgb(1.0, 0.0, 0.0)).id.clone();
        let blue = registry.register_generated_color_image(Color::rgb(0.0, 0.0, 1.0)).id.clone();
        let red_again = registry.register_generated_color_image(Color::rgb(1.0, 0.0, 0.0)).id.clone();

        assert_eq!(red, "GeneratedColor1");
        assert_eq!(blue, "GeneratedColor2");
        assert_eq!(red_again, red);

        let entry = registry.image(&red).unwrap();
        assert!(entry.is_generated);
        match &entry.origin {
            ImageOrigin::Generated(Some(pixels)) => {
                assert_eq!(pixels.dimensions(), (2, 2));
                assert_eq!(pixels.get_pixel(1, 1).0, [255, 0, 0, 255]);
            }
            other => panic!("unexpected origin {:?}", other),
        }
    }

    #[test]
    fn test_resolve_appends_extension_once() {
        let mut registry = AssetRegistry::new();
        let entry = registry.register_generated_image("Lightmap0", None);
        entry.resolve(".jpg");
        entry.resolve(".png");
        assert_eq!(entry.exported_src.as_deref(), Some("Lightmap0.jpg"));
    }

    #[test]
    fn test_mesh_ids() {
        let mut registry = AssetRegistry::new();
        let material = Arc::new(Material::new("Wall", Shader::default()));

        let a = registry.register_mesh(GroupKey::Object(0), "Cube").id.clone();
        let b = registry.register_mesh(GroupKey::Object(1), "Cube").id.clone();
        let c = registry.register_mesh(GroupKey::Object(2), "").id.clone();
        let again = registry.register_mesh(GroupKey::Object(0), "Ignored").id.clone();
        let wall = registry
            .register_mesh(GroupKey::Material { material: Arc::clone(&material), lightmap: 0 }, "Wall")
            .id
            .clone();
        let wall_again = registry
            .register_mesh(GroupKey::Material { material, lightmap: 0 }, "Wall")
            .id
            .clone();

        assert_eq!(a, "Cube");
        assert_eq!(b, "Cube_1");
        assert_eq!(c, "ExportedMesh1");
        assert_eq!(again, "Cube");
        assert_eq!(wall, wall_again);
        assert_eq!(registry.meshes().len(), 4);
    }
}
