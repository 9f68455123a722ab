//! FireBox room export pipeline
//!
//! Turns a host scene into a FireBoxRoom document plus the meshes and images
//! it references:
//! - scene walking and classification
//! - mesh merging by lightmap atlas or material
//! - lightmap baking (baked material, packed atlas, source EXR, unpacked)
//! - glTF/GLB and JPEG/PNG encoders
//! - the room document serializer

pub mod bake;
pub mod gltf;
pub mod lightmap;
pub mod material;
pub mod merge;
pub mod registry;
pub mod room;
pub mod serializer;
pub mod session;
pub mod skybox;
pub mod software;
pub mod textures;
pub mod walker;

pub use gltf::GltfMeshEncoder;
pub use lightmap::{strategy_for, LightmapStrategy};
pub use registry::{AssetImage, AssetMesh, AssetRegistry};
pub use serializer::{RoomSerializer, DOCUMENT_NAME};
pub use session::{ExportReport, ExportSession};
pub use software::SoftwareBaker;
pub use textures::ImageFileEncoder;
pub use walker::SceneWalker;
