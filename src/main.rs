//! FireBox command line exporter

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use firebox_core::config::{ExportConfig, LightmapMode, MergePolicy, MeshFormat, TextureFormat};
use firebox_core::logging::{self, TracingConfig};
use firebox_core::scene::Scene;
use firebox_core::scene_file::load_scene;
use firebox_export::{ExportReport, ExportSession, GltfMeshEncoder, ImageFileEncoder, SceneWalker, SoftwareBaker};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "firebox")]
#[command(author, version, about = "Export scenes to FireBoxRoom documents", long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for reports
    #[arg(short = 'f', long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene into a room directory
    Export(ExportArgs),

    /// Show what an export of a scene would contain
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Scene description (JSON)
    scene: PathBuf,

    /// Export settings (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Export root directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Image format for encoded textures
    #[arg(long, value_enum)]
    texture_format: Option<TextureArg>,

    /// JPEG quality (1-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Write binary glTF instead of glTF with a sidecar buffer
    #[arg(long)]
    glb: bool,

    /// Lightmap mode (none, baked_material, packed, packed_source_exr, unpacked)
    #[arg(long)]
    lightmap_mode: Option<LightmapMode>,

    /// Merge policy (per_object, per_lightmap_id, per_material)
    #[arg(long)]
    merge: Option<MergePolicy>,

    /// Uniform scale applied to every object
    #[arg(long)]
    scale: Option<f32>,

    /// Largest lightmap texture edge
    #[arg(long)]
    max_resolution: Option<u32>,

    /// Rewrite the room document only
    #[arg(long)]
    html_only: bool,

    /// Re-encode images even when the source could be copied
    #[arg(long)]
    force_retranscode: bool,

    /// Skip materials
    #[arg(long)]
    no_materials: bool,

    /// Skip the skybox
    #[arg(long)]
    no_skybox: bool,

    /// Room title
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct InspectArgs {
    /// Scene description (JSON)
    scene: PathBuf,

    /// Export settings (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TextureArg {
    Jpg,
    Png,
}

impl From<TextureArg> for TextureFormat {
    fn from(arg: TextureArg) -> Self {
        match arg {
            TextureArg::Jpg => TextureFormat::Jpg,
            TextureArg::Png => TextureFormat::Png,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Export(args) => cmd_export(args, cli.format),
        Commands::Inspect(args) => cmd_inspect(args, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    match path {
        Some(path) => {
            ExportConfig::from_yaml_file(path).with_context(|| format!("Failed to read settings {:?}", path))
        }
        None => Ok(ExportConfig::default()),
    }
}

fn read_scene(path: &Path) -> Result<Scene> {
    match load_scene(path) {
        Ok(scene) => Ok(scene),
        Err(err) if err.is_not_found() => {
            Err(anyhow::Error::new(err).context(format!("Missing file or reference in scene {:?}", path)))
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("Failed to load scene {:?}", path))),
    }
}

fn apply_overrides(config: &mut ExportConfig, args: &ExportArgs) {
    if let Some(output) = &args.output {
        config.export_path = output.clone();
    }
    if let Some(format) = args.texture_format {
        config.texture_format = format.into();
    }
    if let Some(quality) = args.quality {
        config.texture_quality = quality;
    }
    if args.glb {
        config.mesh_format = MeshFormat::Glb;
    }
    if let Some(mode) = args.lightmap_mode {
        config.lightmap_mode = mode;
    }
    if let Some(policy) = args.merge {
        config.merge_policy = policy;
    }
    if let Some(scale) = args.scale {
        config.uniform_scale = scale;
    }
    if let Some(resolution) = args.max_resolution {
        config.lightmap_max_resolution = resolution;
    }
    if let Some(title) = &args.title {
        config.room_title = title.clone();
    }
    config.html_only |= args.html_only;
    config.force_retranscode |= args.force_retranscode;
    if args.no_materials {
        config.export_materials = false;
    }
    if args.no_skybox {
        config.export_skybox = false;
    }
}

fn cmd_export(args: ExportArgs, format: OutputFormat) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    let scene = read_scene(&args.scene)?;
    debug!(?config, "export settings");

    let mut baker = SoftwareBaker::new();
    let mut mesh_encoder = GltfMeshEncoder::new();
    let mut image_encoder = ImageFileEncoder::new();
    let mut session = ExportSession::new(config, &mut baker, &mut mesh_encoder, &mut image_encoder);

    let report = session
        .run(&scene)
        .with_context(|| format!("Export of {:?} failed", args.scene))?;
    info!(document = %report.document.display(), "room written");
    print_report(&report, format)
}

fn print_report(report: &ExportReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "document": report.document,
                "objects": report.objects,
                "meshes": report.meshes,
                "images": report.images,
                "links": report.links,
                "reflection_probes": report.reflection_probes,
                "skipped": report.skipped,
                "far_distance": report.far_distance,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Room: {}", report.document.display());
            println!("============================================");
            println!("  Objects:            {:>12}", report.objects);
            println!("  Meshes:             {:>12}", report.meshes);
            println!("  Images:             {:>12}", report.images);
            println!("  Links:              {:>12}", report.links);
            println!("  Reflection probes:  {:>12}", report.reflection_probes);
            println!("  Skipped:            {:>12}", report.skipped);
            println!("  Far distance:       {:>12.1}", report.far_distance);
        }
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let scene = read_scene(&args.scene)?;
    let walk = SceneWalker::new(&config).walk(&scene);
    let lightmapped = walk.objects.iter().filter(|o| o.is_lightmapped()).count();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "scene": scene.name,
                "objects": walk.objects.len(),
                "lightmapped": lightmapped,
                "links": walk.links.iter().map(|l| &l.name).collect::<Vec<_>>(),
                "reflection_probes": walk.reflection_probes,
                "skipped": walk.skipped,
                "lightmaps": scene.lightmaps.len(),
                "skybox": scene.skybox.is_some(),
                "far_distance": walk.far_distance(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Scene: {}", scene.name);
            println!("============================================");
            println!("  Objects:            {:>12}", walk.objects.len());
            println!("  Lightmapped:        {:>12}", lightmapped);
            println!("  Links:              {:>12}", walk.links.len());
            println!("  Reflection probes:  {:>12}", walk.reflection_probes);
            println!("  Skipped:            {:>12}", walk.skipped);
            println!("  Lightmap atlases:   {:>12}", scene.lightmaps.len());
            println!("  Skybox:             {:>12}", if scene.skybox.is_some() { "yes" } else { "no" });
            println!("  Far distance:       {:>12.1}", walk.far_distance());
            for link in &walk.links {
                println!("  -> {}", link.name);
            }
        }
    }
    Ok(())
}
