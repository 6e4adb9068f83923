use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::mesh::{IndexGroup, MeshContainer};

/// Options for one OBJ import pass.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Uniform scale applied to vertex positions only.
    pub scale: f32,
    /// Entity name for geometry that appears before any `o`/`g` line.
    pub fallback_name: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            fallback_name: "mesh".to_string(),
        }
    }
}

/// Recoverable problem found while importing.
///
/// Asset conversion is iterative; one bad face must not block a whole
/// mesh, so these are collected and returned rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }

    pub(crate) fn whole_file(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One named entity converted out of an OBJ file.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjEntity {
    pub name: String,
    pub mesh: MeshContainer,
}

/// Result of one OBJ import pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjImport {
    pub entities: Vec<ObjEntity>,
    /// `mtllib` references, in order of appearance.
    pub mtl_libraries: Vec<String>,
    /// Unique `usemtl` names, in order of first use.
    pub material_names: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses an OBJ file from memory into per-entity mesh containers.
///
/// Entities start at `o`/`g` lines; map-editor exports split one
/// logical entity into `<name>_brush0`, `<name>_brush1`, ... groups,
/// which merge back into a single `<name>` entity here. Faces are
/// fan-triangulated and deduplicated so each unique `v/vt/vn`
/// combination is emitted once per entity.
pub fn import_obj_str(data: &str, options: &ImportOptions) -> Result<ObjImport> {
    let mut pass = ImportPass::new(options);
    for (line_no, line) in data.lines().enumerate() {
        pass.line(line_no + 1, line)?;
    }
    pass.finish()
}

struct ImportPass<'a> {
    options: &'a ImportOptions,
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    normals: Vec<Vec3>,
    entities: Vec<EntityBuilder>,
    entity_lookup: HashMap<String, usize>,
    current: Option<usize>,
    active_material: String,
    mtl_libraries: Vec<String>,
    material_names: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ImportPass<'a> {
    fn new(options: &'a ImportOptions) -> Self {
        Self {
            options,
            positions: Vec::new(),
            uvs: Vec::new(),
            normals: Vec::new(),
            entities: Vec::new(),
            entity_lookup: HashMap::new(),
            current: None,
            active_material: "default".to_string(),
            mtl_libraries: Vec::new(),
            material_names: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn line(&mut self, line_no: usize, raw: &str) -> Result<()> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            return Ok(());
        };
        match tag {
            "v" => {
                let position = parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {line_no}"))?;
                self.positions.push(position * self.options.scale);
            }
            "vt" => {
                let uv = parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {line_no}"))?;
                self.uvs.push(uv);
            }
            "vn" => {
                let normal = parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {line_no}"))?;
                self.normals.push(normal);
            }
            "o" | "g" => {
                let name = parts.next().unwrap_or(&self.options.fallback_name);
                self.select_entity(name.to_string());
            }
            "usemtl" => {
                let Some(name) = parts.next() else {
                    self.diagnostics
                        .push(Diagnostic::at(line_no, "usemtl without a material name"));
                    return Ok(());
                };
                self.select_material(name);
            }
            "mtllib" => {
                for library in parts {
                    self.mtl_libraries.push(library.to_string());
                }
            }
            "f" => {
                let elements: Vec<&str> = parts.collect();
                self.face(line_no, &elements);
            }
            _ => {}
        }
        Ok(())
    }

    fn select_entity(&mut self, raw: String) {
        let name = normalize_entity_name(&raw).to_string();
        if let Some(&index) = self.entity_lookup.get(&name) {
            self.current = Some(index);
            return;
        }
        self.entities.push(EntityBuilder::new(name.clone()));
        let index = self.entities.len() - 1;
        self.entity_lookup.insert(name, index);
        self.current = Some(index);
    }

    fn select_material(&mut self, name: &str) {
        if !self.material_names.iter().any(|known| known == name) {
            self.material_names.push(name.to_string());
        }
        self.active_material = name.to_string();
    }

    fn face(&mut self, line_no: usize, elements: &[&str]) {
        if elements.len() < 3 {
            self.diagnostics
                .push(Diagnostic::at(line_no, "face references fewer than 3 vertices"));
            return;
        }

        let mut resolved = Vec::with_capacity(elements.len());
        for element in elements {
            match resolve_element(element, self.positions.len(), self.uvs.len(), self.normals.len())
            {
                Ok(reference) => resolved.push((*element, reference)),
                Err(message) => {
                    // Emitting a partial fan from a broken face would
                    // fabricate geometry; skip the whole face.
                    self.diagnostics
                        .push(Diagnostic::at(line_no, format!("{message}, face skipped")));
                    return;
                }
            }
        }

        let entity_index = self.ensure_entity();
        let entity = &mut self.entities[entity_index];
        let group_index = entity.ensure_group(&self.active_material);

        let emitted: Vec<u32> = resolved
            .into_iter()
            .map(|(token, reference)| {
                entity.emit(token, reference, &self.positions, &self.uvs, &self.normals)
            })
            .collect();

        let indices = &mut entity.groups[group_index].indices;
        for i in 1..emitted.len() - 1 {
            indices.extend_from_slice(&[emitted[0], emitted[i], emitted[i + 1]]);
        }
    }

    fn ensure_entity(&mut self) -> usize {
        if let Some(index) = self.current {
            return index;
        }
        self.select_entity(self.options.fallback_name.clone());
        self.current.expect("entity selected above")
    }

    fn finish(self) -> Result<ObjImport> {
        let mut diagnostics = self.diagnostics;
        let mut entities = Vec::new();
        for builder in self.entities {
            let name = builder.name.clone();
            let mesh = builder.build();
            if mesh.groups.is_empty() {
                diagnostics.push(Diagnostic::whole_file(format!(
                    "entity {name:?} produced no triangles and was dropped"
                )));
            } else {
                entities.push(ObjEntity { name, mesh });
            }
        }

        if entities.is_empty() {
            return Err(anyhow!("OBJ file does not define any triangles"));
        }

        Ok(ObjImport {
            entities,
            mtl_libraries: self.mtl_libraries,
            material_names: self.material_names,
            diagnostics,
        })
    }
}

struct EntityBuilder {
    name: String,
    lookup: HashMap<String, u32>,
    positions: Vec<f32>,
    uvs: Vec<f32>,
    normals: Vec<f32>,
    has_uvs: bool,
    has_normals: bool,
    groups: Vec<IndexGroup>,
    group_lookup: HashMap<String, usize>,
}

impl EntityBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            lookup: HashMap::new(),
            positions: Vec::new(),
            uvs: Vec::new(),
            normals: Vec::new(),
            has_uvs: false,
            has_normals: false,
            groups: Vec::new(),
            group_lookup: HashMap::new(),
        }
    }

    fn ensure_group(&mut self, material: &str) -> usize {
        if let Some(&index) = self.group_lookup.get(material) {
            return index;
        }
        self.groups.push(IndexGroup {
            material: material.to_string(),
            indices: Vec::new(),
        });
        let index = self.groups.len() - 1;
        self.group_lookup.insert(material.to_string(), index);
        index
    }

    fn emit(
        &mut self,
        token: &str,
        reference: ElementRef,
        positions: &[Vec3],
        uvs: &[Vec2],
        normals: &[Vec3],
    ) -> u32 {
        if let Some(&index) = self.lookup.get(token) {
            return index;
        }

        let index = (self.positions.len() / 3) as u32;
        let position = positions[reference.position];
        self.positions
            .extend_from_slice(&[position.x, position.y, position.z]);

        let uv = reference.uv.map(|i| uvs[i]);
        self.has_uvs |= uv.is_some();
        let uv = uv.unwrap_or(Vec2::ZERO);
        self.uvs.extend_from_slice(&[uv.x, uv.y]);

        let normal = reference.normal.map(|i| normals[i]);
        self.has_normals |= normal.is_some();
        let normal = normal.unwrap_or(Vec3::Y);
        self.normals
            .extend_from_slice(&[normal.x, normal.y, normal.z]);

        self.lookup.insert(token.to_string(), index);
        index
    }

    fn build(self) -> MeshContainer {
        MeshContainer {
            vertices: self.positions,
            uvs: self.has_uvs.then_some(self.uvs),
            normals: self.has_normals.then_some(self.normals),
            groups: self
                .groups
                .into_iter()
                .filter(|group| !group.indices.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ElementRef {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

fn resolve_element(
    token: &str,
    positions: usize,
    uvs: usize,
    normals: usize,
) -> std::result::Result<ElementRef, String> {
    let mut segments = token.split('/');
    let vertex_raw = segments.next().unwrap_or("");
    let Ok(vertex) = vertex_raw.parse::<i32>() else {
        return Err(format!("unparsable face element {token:?}"));
    };
    let Some(position) = fix_index(vertex, positions) else {
        return Err(format!("vertex index {vertex} is out of range"));
    };

    // Missing or unresolvable UV/normal references fall back to the
    // defaults at emit time instead of failing the face.
    let uv = segments
        .next()
        .and_then(|segment| segment.parse::<i32>().ok())
        .and_then(|index| fix_index(index, uvs));
    let normal = segments
        .next()
        .and_then(|segment| segment.parse::<i32>().ok())
        .and_then(|index| fix_index(index, normals));

    Ok(ElementRef {
        position,
        uv,
        normal,
    })
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = (-index) as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

/// Strips the map-editor `_brushN` suffix so split brush groups land in
/// one logical entity.
fn normalize_entity_name(raw: &str) -> &str {
    if let Some((stem, tail)) = raw.rsplit_once('_') {
        if let Some(digits) = tail.strip_prefix("brush") {
            if !stem.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            {
                return stem;
            }
        }
    }
    raw
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_component(&mut parts)?;
    let y = next_component(&mut parts)?;
    let z = next_component(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_component(&mut parts)?;
    let v = next_component(&mut parts)?;
    Ok(Vec2::new(u, v))
}

fn next_component<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?)
}
