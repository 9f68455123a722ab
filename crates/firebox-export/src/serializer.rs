//! Room document serializer
//!
//! Builds the FireBox room markup in one pass over the registry, the room
//! objects and the link portals. Output is deterministic: elements follow
//! registration order and floats use `Display` with negative zero printed as
//! `0`.

use std::path::Path;

use firebox_core::config::{ExportConfig, LightmapMode, ScaleClamp};
use firebox_core::types::Color;
use firebox_core::{Error, Result, ResultExt};
use glam::{Vec3, Vec4};
use tracing::{debug, info};

use crate::registry::AssetRegistry;
use crate::room::{RoomObject, RoomTransform};
use crate::skybox::SkyboxIds;
use crate::walker::LinkObject;

/// Document format version written after the title
pub const FORMAT_VERSION: u32 = 203;

/// File name of the room document in the export root
pub const DOCUMENT_NAME: &str = "index.html";

/// Serializer settings taken from the export configuration
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub title: String,
    pub lightmap_mode: LightmapMode,
    pub scale_clamp: ScaleClamp,
    pub uniform_scale: f32,
}

impl DocumentOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            title: config.room_title.clone(),
            lightmap_mode: config.lightmap_mode,
            scale_clamp: config.lightmap_scale_clamp,
            uniform_scale: config.uniform_scale,
        }
    }
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// Everything the document references
pub struct RoomContents<'a> {
    pub registry: &'a AssetRegistry,
    pub rooms: &'a [RoomObject],
    pub links: &'a [LinkObject],
    pub skybox: Option<&'a SkyboxIds>,
    pub far_distance: f32,
}

/// Room document writer
pub struct RoomSerializer {
    options: DocumentOptions,
}

impl RoomSerializer {
    pub fn new(options: DocumentOptions) -> Self {
        Self { options }
    }

    /// Build the document text
    pub fn serialize(&self, contents: &RoomContents<'_>) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str("<html>\n\t<head>\n\t\t<title>");
        out.push_str(&escape(&self.options.title));
        out.push_str(&format!(" v{}</title>\n\t</head>\n\t<body>\n\t\t<FireBoxRoom>\n\t\t\t<Assets>", FORMAT_VERSION));

        for mesh in contents.registry.meshes() {
            if let Some(src) = &mesh.src {
                out.push_str(&format!(
                    "\n\t\t\t\t<AssetObject id=\"{}\" src=\"{}\" />",
                    escape(&mesh.id),
                    escape(src)
                ));
            }
        }
        for image in contents.registry.images() {
            if let Some(src) = &image.exported_src {
                out.push_str(&format!(
                    "\n\t\t\t\t<AssetImage id=\"{}\" src=\"{}\" />",
                    escape(&image.id),
                    escape(src)
                ));
            }
        }

        out.push_str("\n\t\t\t</Assets>\n\t\t\t<Room far_dist=\"");
        out.push_str(&float(contents.far_distance));
        out.push('"');
        if let Some(skybox) = contents.skybox {
            for (face, id) in skybox.faces() {
                if is_image_resolved(contents.registry, id) {
                    out.push_str(&format!(" skybox_{}_id=\"{}\"", face, escape(id)));
                }
            }
        }
        out.push('>');

        let mut objects = 0;
        for room in contents.rooms {
            if self.write_object(&mut out, room, contents.registry) {
                objects += 1;
            }
        }
        for link in contents.links {
            self.write_link(&mut out, link);
        }

        out.push_str("\n\t\t\t</Room>\n\t\t</FireBoxRoom>\n\t</body>\n</html>");
        debug!(objects, links = contents.links.len(), bytes = out.len(), "serialized room");
        out
    }

    /// Serialize and write `index.html` into `root`
    pub fn write(&self, root: &Path, contents: &RoomContents<'_>) -> Result<String> {
        let document = self.serialize(contents);
        let path = root.join(DOCUMENT_NAME);
        std::fs::write(&path, &document)
            .map_err(Error::from)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote room document");
        Ok(document)
    }

    /// Returns false when the mesh was never written and the object is left out
    fn write_object(&self, out: &mut String, room: &RoomObject, registry: &AssetRegistry) -> bool {
        let Some(mesh) = registry.mesh(&room.mesh_id) else {
            return false;
        };
        if mesh.src.is_none() {
            return false;
        }

        let id = escape(&room.mesh_id);
        out.push_str(&format!("\n\t\t\t\t<Object id=\"{}\" lighting=\"true\" ", id));

        if let Some(image) = room.image_id.as_deref().filter(|i| is_image_resolved(registry, i)) {
            attr(out, "image_id", &escape(image));
        }
        if let Some(lightmap) = room.lightmap_id.as_deref().filter(|i| is_image_resolved(registry, i)) {
            attr(out, "lmap_id", &escape(lightmap));
            if self.options.lightmap_mode.uses_atlas_scale() {
                if let Some(scale_offset) = room.lightmap_scale_offset {
                    let (lo, hi) = self.options.scale_clamp.range();
                    attr(out, "lmap_sca", &vec4(scale_offset.clamp(Vec4::splat(lo), Vec4::splat(hi))));
                }
            }
        }
        if let Some(tiling) = room.tiling {
            attr(out, "tile", &vec4(tiling));
        }
        if room.has_collider {
            attr(out, "collision_id", &id);
        }
        if let Some(color) = room.color {
            attr(out, "col", &hex_color(color));
        }

        let transform = RoomTransform::convert(&room.transform, self.options.uniform_scale);
        attr(out, "pos", &vec3(transform.pos));
        if transform.cull_front() {
            attr(out, "cull_face", "front");
        }
        write_basis(out, &transform);
        out.push_str("/>");
        true
    }

    fn write_link(&self, out: &mut String, link: &LinkObject) {
        let t = &link.transform;
        // portals are placed by their bottom edge
        let bottom = t.position - t.up() * (t.scale.y * 0.5);
        let transform = RoomTransform::at(bottom, t, self.options.uniform_scale);

        out.push_str("\n\t\t\t\t<Link ");
        attr(out, "url", &escape(&link.portal.url));
        attr(out, "title", &escape(&link.portal.title));
        attr(out, "pos", &vec3(transform.pos));
        attr(out, "col", &hex_color(link.portal.color));
        write_basis(out, &transform);
        attr(out, "draw_glow", bool_str(link.portal.draw_glow));
        attr(out, "draw_text", bool_str(link.portal.draw_text));
        attr(out, "auto_load", bool_str(link.portal.auto_load));
        out.push_str("/>");
    }
}

fn is_image_resolved(registry: &AssetRegistry, id: &str) -> bool {
    registry.image(id).is_some_and(|image| image.exported_src.is_some())
}

fn write_basis(out: &mut String, transform: &RoomTransform) {
    attr(out, "scale", &vec3(transform.scale));
    attr(out, "xdir", &vec3(transform.xdir));
    attr(out, "ydir", &vec3(transform.ydir));
    attr(out, "zdir", &vec3(transform.zdir));
}

fn attr(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(value);
    out.push_str("\" ");
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn hex_color(color: Color) -> String {
    format!("#f{}", color.to_hex_rgb())
}

/// Locale-independent float, `-0` printed as `0`
pub fn float(value: f32) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn vec3(v: Vec3) -> String {
    format!("{} {} {}", float(v.x), float(v.y), float(v.z))
}

fn vec4(v: Vec4) -> String {
    format!("{} {} {} {}", float(v.x), float(v.y), float(v.z), float(v.w))
}

/// Escape text for a double-quoted attribute
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
