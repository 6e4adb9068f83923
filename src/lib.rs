//! Binary mesh and skeletal animation asset pipeline.
//!
//! The crate covers both ends of the content path: an offline
//! OBJ-to-container converter that triangulates, deduplicates and
//! groups geometry by material, and the runtime-side decoders that
//! turn the binary containers back into typed buffers ready for
//! upload, plus a pose sampler over decoded animation timelines.
//! Rendering, input and the rest of the game runtime are intentionally
//! kept outside of the crate so that the code remains testable and
//! easy to embed in headless tools.

pub mod animation;
pub mod assets;
pub mod binary;
pub mod materials;
pub mod mesh;
pub mod obj;

pub use animation::{Aabb, AnimationClip, Frame, JointTransform, Pose};
pub use assets::AssetLibrary;
pub use binary::FormatError;
pub use materials::{MaterialDescriptor, MaterialSet, TextureSlot};
pub use mesh::{IndexGroup, MeshContainer};
pub use obj::{import_obj_str, Diagnostic, ImportOptions, ObjEntity, ObjImport};
