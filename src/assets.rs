use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;
use parking_lot::RwLock;

use crate::animation::AnimationClip;
use crate::mesh::MeshContainer;

/// Runtime asset loader with a decode cache.
///
/// Containers are immutable once decoded and are handed out behind
/// `Arc`, so every consumer shares one decoded copy. Decode failures
/// are fatal with file context: a corrupted asset must refuse to load
/// rather than hand wrong geometry to the renderer.
#[derive(Debug)]
pub struct AssetLibrary {
    root: PathBuf,
    meshes: RwLock<HashMap<String, Arc<MeshContainer>>>,
    animations: RwLock<HashMap<String, Arc<AnimationClip>>>,
}

impl AssetLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            meshes: RwLock::new(HashMap::new()),
            animations: RwLock::new(HashMap::new()),
        }
    }

    /// `meshes/<name>.bmesh` under the library root.
    pub fn mesh_path(&self, name: &str) -> PathBuf {
        self.root.join("meshes").join(format!("{name}.bmesh"))
    }

    /// `animations/<name>.banim` under the library root.
    pub fn animation_path(&self, name: &str) -> PathBuf {
        self.root.join("animations").join(format!("{name}.banim"))
    }

    /// Loads a mesh container by name, decoding it on first use.
    pub fn load_mesh(&self, name: &str) -> Result<Arc<MeshContainer>> {
        if let Some(mesh) = self.meshes.read().get(name) {
            return Ok(Arc::clone(mesh));
        }
        let path = self.mesh_path(name);
        let data =
            fs::read(&path).with_context(|| format!("unable to read {}", path.display()))?;
        let mesh = MeshContainer::decode(&data)
            .with_context(|| format!("corrupt mesh container {}", path.display()))?;
        debug!(
            "decoded mesh {name:?} ({} vertices, {} triangles)",
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        let mesh = Arc::new(mesh);
        self.meshes
            .write()
            .insert(name.to_string(), Arc::clone(&mesh));
        Ok(mesh)
    }

    /// Loads an animation clip by name, decoding it on first use.
    pub fn load_animation(&self, name: &str) -> Result<Arc<AnimationClip>> {
        if let Some(clip) = self.animations.read().get(name) {
            return Ok(Arc::clone(clip));
        }
        let path = self.animation_path(name);
        let data =
            fs::read(&path).with_context(|| format!("unable to read {}", path.display()))?;
        let clip = AnimationClip::decode(&data)
            .with_context(|| format!("corrupt animation container {}", path.display()))?;
        debug!(
            "decoded animation {name:?} ({} frames, {} joints)",
            clip.frames.len(),
            clip.joint_count()
        );
        let clip = Arc::new(clip);
        self.animations
            .write()
            .insert(name.to_string(), Arc::clone(&clip));
        Ok(clip)
    }

    /// Drops every cached container so changed files are re-read.
    pub fn clear(&self) {
        self.meshes.write().clear();
        self.animations.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Frame, JointTransform};
    use crate::mesh::IndexGroup;
    use tempfile::TempDir;

    fn sample_mesh() -> MeshContainer {
        MeshContainer {
            vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            uvs: None,
            normals: None,
            groups: vec![IndexGroup {
                material: "default".to_string(),
                indices: vec![0, 1, 2],
            }],
        }
    }

    fn library_with_mesh(name: &str) -> (TempDir, AssetLibrary) {
        let dir = TempDir::new().unwrap();
        let meshes = dir.path().join("meshes");
        fs::create_dir_all(&meshes).unwrap();
        fs::write(meshes.join(format!("{name}.bmesh")), sample_mesh().encode()).unwrap();
        let library = AssetLibrary::new(dir.path());
        (dir, library)
    }

    #[test]
    fn loads_and_caches_meshes() {
        let (_dir, library) = library_with_mesh("crate");
        let first = library.load_mesh("crate").unwrap();
        assert_eq!(*first, sample_mesh());
        let second = library.load_mesh("crate").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn clear_forces_a_reload() {
        let (_dir, library) = library_with_mesh("crate");
        let first = library.load_mesh("crate").unwrap();
        library.clear();
        let second = library.load_mesh("crate").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_mesh_is_an_error() {
        let dir = TempDir::new().unwrap();
        let library = AssetLibrary::new(dir.path());
        assert!(library.load_mesh("nothing").is_err());
    }

    #[test]
    fn corrupt_mesh_is_an_error() {
        let (dir, library) = library_with_mesh("crate");
        let path = dir.path().join("meshes/broken.bmesh");
        let mut bytes = sample_mesh().encode();
        bytes.truncate(20);
        fs::write(path, bytes).unwrap();
        let err = library.load_mesh("broken").unwrap_err();
        assert!(format!("{err:#}").contains("corrupt mesh container"));
    }

    #[test]
    fn loads_animations_by_convention() {
        let dir = TempDir::new().unwrap();
        let animations = dir.path().join("animations");
        fs::create_dir_all(&animations).unwrap();
        let clip = AnimationClip {
            frame_rate: 24,
            frames: vec![Frame {
                joints: vec![JointTransform::default(); 3],
            }],
            bounds: None,
        };
        fs::write(animations.join("idle.banim"), clip.encode()).unwrap();

        let library = AssetLibrary::new(dir.path());
        let loaded = library.load_animation("idle").unwrap();
        assert_eq!(*loaded, clip);
        assert_eq!(loaded.joint_count(), 3);
    }
}
