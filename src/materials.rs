use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::obj::Diagnostic;

/// Texture slots a material can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextureSlot {
    Albedo,
    Normal,
    Emissive,
    ReflectionMask,
    Roughness,
    Metallic,
    Specular,
}

impl TextureSlot {
    /// Maps a source-texture filename suffix onto a slot.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "diffuse" | "albedo" => Self::Albedo,
            "normal" => Self::Normal,
            "emissive" | "glow" => Self::Emissive,
            "mask" => Self::ReflectionMask,
            "roughness" => Self::Roughness,
            "metallic" => Self::Metallic,
            "specular" => Self::Specular,
            _ => return None,
        })
    }
}

/// Material name plus its texture-slot assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    pub name: String,
    #[serde(default)]
    pub textures: BTreeMap<TextureSlot, String>,
}

impl MaterialDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            textures: BTreeMap::new(),
        }
    }
}

/// All materials referenced by one converted source file; serialized
/// beside the meshes as `materials.mat`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterialSet {
    pub materials: Vec<MaterialDescriptor>,
}

impl MaterialSet {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("material set serializes to JSON")
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).context("invalid materials file")
    }
}

/// Material definition extracted from a `.mtl` library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtlMaterial {
    pub name: String,
    pub diffuse_map: Option<String>,
}

/// Parses the `newmtl`/`map_Kd` statements of an MTL library. Other
/// statements are ignored.
pub fn parse_mtl_str(data: &str) -> Vec<MtlMaterial> {
    let mut materials: Vec<MtlMaterial> = Vec::new();
    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        match parts.next() {
            Some("newmtl") => {
                if let Some(name) = parts.next() {
                    materials.push(MtlMaterial {
                        name: name.to_string(),
                        diffuse_map: None,
                    });
                }
            }
            Some("map_Kd") => {
                if let (Some(path), Some(current)) = (parts.next(), materials.last_mut()) {
                    current.diffuse_map = Some(path.to_string());
                }
            }
            _ => {}
        }
    }
    materials
}

/// Derives the material set for one converted OBJ.
///
/// MTL libraries are resolved relative to `source_dir`; converted WebP
/// textures land in `output_dir`. Missing libraries, missing source
/// textures and failed conversions degrade to diagnostics so one bad
/// asset never sinks the batch; only the slot assignments themselves
/// are guaranteed, not the existence of every output file.
pub fn build_material_set(
    source_dir: &Path,
    output_dir: &Path,
    mtl_libraries: &[String],
    material_names: &[String],
    diagnostics: &mut Vec<Diagnostic>,
) -> MaterialSet {
    let mut defined: HashMap<String, MtlMaterial> = HashMap::new();
    for library in mtl_libraries {
        let path = source_dir.join(library);
        match fs::read_to_string(&path) {
            Ok(data) => {
                for material in parse_mtl_str(&data) {
                    defined.insert(material.name.clone(), material);
                }
            }
            Err(err) => diagnostics.push(Diagnostic::whole_file(format!(
                "material library {library:?} could not be read ({err}); continuing without it"
            ))),
        }
    }

    let mut materials = Vec::with_capacity(material_names.len());
    for name in material_names {
        let mut descriptor = MaterialDescriptor::new(name.clone());
        match defined.get(name).and_then(|m| m.diffuse_map.clone()) {
            Some(diffuse_map) => {
                attach_textures(
                    source_dir,
                    output_dir,
                    &diffuse_map,
                    &mut descriptor,
                    diagnostics,
                );
            }
            None => {
                diagnostics.push(Diagnostic::whole_file(format!(
                    "material {name:?} is not defined by any MTL library, synthesized"
                )));
                descriptor
                    .textures
                    .insert(TextureSlot::Albedo, format!("{name}.webp"));
            }
        }
        materials.push(descriptor);
    }

    MaterialSet { materials }
}

fn attach_textures(
    source_dir: &Path,
    output_dir: &Path,
    diffuse_map: &str,
    descriptor: &mut MaterialDescriptor,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let source = source_dir.join(diffuse_map);
    let stem = match source.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem.to_string(),
        None => {
            diagnostics.push(Diagnostic::whole_file(format!(
                "diffuse map {diffuse_map:?} has no usable file name"
            )));
            return;
        }
    };

    let (base, slot) = split_texture_suffix(&stem);
    let slot = slot.unwrap_or(TextureSlot::Albedo);
    convert_and_assign(&source, output_dir, &stem, slot, descriptor, diagnostics);

    // Companion maps share the diffuse map's base name.
    let texture_dir = source.parent().unwrap_or(source_dir);
    let Ok(entries) = fs::read_dir(texture_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(sibling_stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if sibling_stem == stem {
            continue;
        }
        let (sibling_base, sibling_slot) = split_texture_suffix(sibling_stem);
        let Some(sibling_slot) = sibling_slot else {
            continue;
        };
        if sibling_base != base || descriptor.textures.contains_key(&sibling_slot) {
            continue;
        }
        convert_and_assign(
            &path,
            output_dir,
            sibling_stem,
            sibling_slot,
            descriptor,
            diagnostics,
        );
    }
}

fn convert_and_assign(
    source: &Path,
    output_dir: &Path,
    stem: &str,
    slot: TextureSlot,
    descriptor: &mut MaterialDescriptor,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let output_name = format!("{stem}.webp");
    if source.is_file() {
        if let Err(err) = convert_to_webp(source, &output_dir.join(&output_name)) {
            diagnostics.push(Diagnostic::whole_file(format!(
                "texture {} was not converted ({err:#}); {output_name} may not exist",
                source.display()
            )));
        }
    } else {
        diagnostics.push(Diagnostic::whole_file(format!(
            "texture {} not found; {output_name} may not exist",
            source.display()
        )));
    }
    descriptor.textures.insert(slot, output_name);
}

/// Splits `crate_diffuse` into `("crate", Some(Albedo))`; stems without
/// a recognized suffix keep their full name as the base.
fn split_texture_suffix(stem: &str) -> (&str, Option<TextureSlot>) {
    if let Some((base, suffix)) = stem.rsplit_once('_') {
        if let Some(slot) = TextureSlot::from_suffix(suffix) {
            if !base.is_empty() {
                return (base, Some(slot));
            }
        }
    }
    (stem, None)
}

fn convert_to_webp(source: &Path, dest: &Path) -> Result<()> {
    let status = Command::new("cwebp")
        .arg("-lossless")
        .arg("-quiet")
        .arg(source)
        .arg("-o")
        .arg(dest)
        .status()
        .context("unable to launch cwebp")?;
    if !status.success() {
        bail!("cwebp exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn suffixes_map_onto_slots() {
        assert_eq!(TextureSlot::from_suffix("diffuse"), Some(TextureSlot::Albedo));
        assert_eq!(TextureSlot::from_suffix("albedo"), Some(TextureSlot::Albedo));
        assert_eq!(TextureSlot::from_suffix("glow"), Some(TextureSlot::Emissive));
        assert_eq!(TextureSlot::from_suffix("mask"), Some(TextureSlot::ReflectionMask));
        assert_eq!(TextureSlot::from_suffix("roughness"), Some(TextureSlot::Roughness));
        assert_eq!(TextureSlot::from_suffix("wood"), None);
    }

    #[test]
    fn stem_splitting_keeps_unrecognized_names_whole() {
        assert_eq!(
            split_texture_suffix("crate_diffuse"),
            ("crate", Some(TextureSlot::Albedo))
        );
        assert_eq!(split_texture_suffix("crate_top"), ("crate_top", None));
        assert_eq!(split_texture_suffix("crate"), ("crate", None));
    }

    #[test]
    fn parses_newmtl_and_map_kd() {
        let mtl = "\
# comment
newmtl stone
Ka 1 1 1
map_Kd stone_diffuse.png
newmtl flat
";
        let materials = parse_mtl_str(mtl);
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[0].name, "stone");
        assert_eq!(materials[0].diffuse_map.as_deref(), Some("stone_diffuse.png"));
        assert_eq!(materials[1].name, "flat");
        assert_eq!(materials[1].diffuse_map, None);
    }

    #[test]
    fn undefined_materials_are_synthesized() {
        let dir = TempDir::new().unwrap();
        let mut diagnostics = Vec::new();
        let set = build_material_set(
            dir.path(),
            dir.path(),
            &[],
            &["lava".to_string()],
            &mut diagnostics,
        );
        assert_eq!(set.materials.len(), 1);
        assert_eq!(
            set.materials[0].textures.get(&TextureSlot::Albedo),
            Some(&"lava.webp".to_string())
        );
        assert!(diagnostics.iter().any(|d| d.message.contains("synthesized")));
    }

    #[test]
    fn missing_mtl_library_is_a_diagnostic() {
        let dir = TempDir::new().unwrap();
        let mut diagnostics = Vec::new();
        build_material_set(
            dir.path(),
            dir.path(),
            &["missing.mtl".to_string()],
            &["stone".to_string()],
            &mut diagnostics,
        );
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("missing.mtl")));
    }

    #[test]
    fn companion_textures_fill_vacant_slots() {
        let dir = TempDir::new().unwrap();
        let mut mtl = File::create(dir.path().join("level.mtl")).unwrap();
        writeln!(mtl, "newmtl crate\nmap_Kd crate_diffuse.png").unwrap();
        File::create(dir.path().join("crate_diffuse.png")).unwrap();
        File::create(dir.path().join("crate_glow.png")).unwrap();
        File::create(dir.path().join("barrel_glow.png")).unwrap();

        let mut diagnostics = Vec::new();
        let set = build_material_set(
            dir.path(),
            dir.path(),
            &["level.mtl".to_string()],
            &["crate".to_string()],
            &mut diagnostics,
        );

        let textures = &set.materials[0].textures;
        assert_eq!(
            textures.get(&TextureSlot::Albedo),
            Some(&"crate_diffuse.webp".to_string())
        );
        assert_eq!(
            textures.get(&TextureSlot::Emissive),
            Some(&"crate_glow.webp".to_string())
        );
        // barrel_glow has a different base name and stays unattached.
        assert_eq!(textures.len(), 2);
    }

    #[test]
    fn material_set_round_trips_through_json() {
        let mut descriptor = MaterialDescriptor::new("stone");
        descriptor
            .textures
            .insert(TextureSlot::Albedo, "stone_diffuse.webp".to_string());
        descriptor
            .textures
            .insert(TextureSlot::ReflectionMask, "stone_mask.webp".to_string());
        let set = MaterialSet {
            materials: vec![descriptor],
        };

        let json = set.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value["materials"][0]["textures"]["reflectionMask"],
            "stone_mask.webp"
        );
        assert_eq!(MaterialSet::from_json(&json).unwrap(), set);
    }
}
