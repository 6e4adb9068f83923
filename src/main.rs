use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::warn;

use bmesh_pipeline::materials::build_material_set;
use bmesh_pipeline::obj::{import_obj_str, ImportOptions};

const USAGE: &str =
    "Usage: bmesh-convert <input.obj> [--mesh|-m] [--both|-a] [--scale|-s <n>] [--help|-h]";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let options = match CliOptions::parse() {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(&options) {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run(options: &CliOptions) -> Result<()> {
    let data = fs::read_to_string(&options.input)
        .with_context(|| format!("unable to read {}", options.input.display()))?;
    let fallback_name = options
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("mesh")
        .to_string();

    let import_options = ImportOptions {
        scale: options.scale,
        fallback_name,
    };
    let import = import_obj_str(&data, &import_options)
        .with_context(|| format!("failed to convert {}", options.input.display()))?;

    let out_dir = options.input.parent().unwrap_or(Path::new("."));
    for entity in &import.entities {
        if options.output.binary() {
            let path = out_dir.join(format!("{}.bmesh", entity.name));
            fs::write(&path, entity.mesh.encode())
                .with_context(|| format!("unable to write {}", path.display()))?;
        }
        if options.output.json() {
            let path = out_dir.join(format!("{}.mesh", entity.name));
            let json = serde_json::to_string_pretty(&entity.mesh)
                .context("mesh serialization failed")?;
            fs::write(&path, json)
                .with_context(|| format!("unable to write {}", path.display()))?;
        }
    }

    let mut diagnostics = import.diagnostics.clone();
    let materials = build_material_set(
        out_dir,
        out_dir,
        &import.mtl_libraries,
        &import.material_names,
        &mut diagnostics,
    );
    let materials_path = out_dir.join("materials.mat");
    fs::write(&materials_path, materials.to_json())
        .with_context(|| format!("unable to write {}", materials_path.display()))?;

    for diagnostic in &diagnostics {
        warn!("{diagnostic}");
    }

    println!(
        "Converted {} with {} entity(ies)",
        options.input.display(),
        import.entities.len()
    );
    for entity in &import.entities {
        println!(
            " - {} ({} vertices, {} triangles, {} material groups)",
            entity.name,
            entity.mesh.vertex_count(),
            entity.mesh.triangle_count(),
            entity.mesh.groups.len()
        );
    }
    println!("Wrote {} material(s) to materials.mat", materials.materials.len());

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputKind {
    Binary,
    Json,
    Both,
}

impl OutputKind {
    fn binary(self) -> bool {
        matches!(self, Self::Binary | Self::Both)
    }

    fn json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

struct CliOptions {
    input: PathBuf,
    output: OutputKind,
    scale: f32,
}

impl CliOptions {
    /// Returns `None` when `--help` was requested. Input validation
    /// happens here, before anything is written.
    fn parse() -> Result<Option<Self>> {
        let args: Vec<String> = env::args().skip(1).collect();
        if args.iter().any(|arg| arg == "--help" || arg == "-h") {
            return Ok(None);
        }

        let mut input = None;
        let mut output = OutputKind::Binary;
        let mut scale = 1.0_f32;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--mesh" | "-m" => output = OutputKind::Json,
                "--both" | "-a" => output = OutputKind::Both,
                "--scale" | "-s" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow!("--scale expects a value. {USAGE}"))?;
                    scale = value
                        .parse()
                        .map_err(|_| anyhow!("invalid scale {value:?}"))?;
                }
                other if other.starts_with('-') => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
                other => {
                    if input.is_some() {
                        return Err(anyhow!("more than one input path given. {USAGE}"));
                    }
                    input = Some(PathBuf::from(other));
                }
            }
        }

        let Some(input) = input else {
            return Err(anyhow!("{USAGE}"));
        };
        let is_obj = input
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("obj"));
        if !is_obj {
            return Err(anyhow!("input {} is not an .obj file", input.display()));
        }
        if !input.is_file() {
            return Err(anyhow!("input {} does not exist", input.display()));
        }

        Ok(Some(Self {
            input,
            output,
            scale,
        }))
    }
}
