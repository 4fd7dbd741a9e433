//! Scene Export CLI
//!
//! Export scene snapshots to GLB/USDZ and maintain the export directory.

use clap::{Parser, Subcommand};
use scene_export::config::{CompressionMode, ConverterMode};
use scene_export::orchestrator::sweep_once;
use scene_export::source::{FsModelSource, FsTextureSource, JsonSnapshotSource};
use scene_export::{read_glb, ExportConfig, ExportOrchestrator, ExportPipeline, ExportRequest, JobStatus, MemoryJobStore};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scene-export")]
#[command(author, version, about = "Export parametric scenes to GLB and USDZ", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the export root directory
    #[arg(long, global = true)]
    export_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one scene snapshot and wait for the result
    Export {
        /// Directory holding `{key}.json` snapshots
        #[arg(short, long)]
        snapshots: PathBuf,

        /// Snapshot key (file name without `.json`)
        #[arg(short, long)]
        key: String,

        /// Directory model file paths are resolved against
        #[arg(short, long)]
        models: PathBuf,

        /// Output name (defaults to the scene name)
        #[arg(short, long)]
        name: Option<String>,

        /// Also produce a USDZ
        #[arg(long)]
        usdz: bool,

        /// Skip geometry compression
        #[arg(long)]
        no_compress: bool,
    },

    /// Remove expired exports once
    Sweep,

    /// Show the contents of a GLB file
    Inspect {
        /// GLB file to read
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<ExportConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default().with_env(),
    };
    if let Some(root) = &cli.export_root {
        config = config.with_export_root(root);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Export {
            snapshots,
            key,
            models,
            name,
            usdz,
            no_compress,
        } => {
            let mut config = config;
            if no_compress {
                config.compression.mode = CompressionMode::None;
            }
            if usdz && config.converter.mode == ConverterMode::None {
                config.converter.mode = ConverterMode::Local;
            }
            run_export(config, snapshots, key, models, name, usdz).await?;
        }
        Commands::Sweep => {
            let report = sweep_once(&config, &MemoryJobStore::new());
            println!(
                "Removed {} expired export(s) from {:?}",
                report.dirs_removed, config.export_root
            );
        }
        Commands::Inspect { input } => {
            inspect(&input)?;
        }
    }

    Ok(())
}

async fn run_export(
    config: ExportConfig,
    snapshots: PathBuf,
    key: String,
    models: PathBuf,
    name: Option<String>,
    usdz: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Exporting scene '{}' from {:?}...", key, snapshots);

    let textures = FsTextureSource::new(config.texture_root.clone()).with_base_dir(snapshots.clone());
    let pipeline = ExportPipeline::new(
        config,
        JsonSnapshotSource::new(snapshots),
        FsModelSource::new(models),
        textures,
    )?;
    let orchestrator = ExportOrchestrator::new(pipeline);

    let mut request = ExportRequest::new(key).with_secondary(usdz);
    if let Some(name) = name {
        request = request.with_output_name(name);
    }
    let id = orchestrator.enqueue(request).await?;
    let job = orchestrator.wait(&id, Duration::from_millis(100)).await?;
    // A used HTTP converter holds a blocking client that must not drop on the executor.
    tokio::task::spawn_blocking(move || drop(orchestrator)).await?;

    match (job.status, job.result) {
        (JobStatus::Completed, Some(result)) => {
            println!("Export {} finished", result.export_id);
            println!("  GLB:  {:?} ({})", result.primary.path, result.primary.size_formatted);
            if let Some(secondary) = &result.secondary {
                println!("  USDZ: {:?} ({})", secondary.path, secondary.size_formatted);
            }
            if let Some(error) = &result.secondary_error {
                println!("  USDZ failed: {}", error);
            }
            for warning in &result.warnings {
                println!("  warning: {}", warning);
            }
            Ok(())
        }
        _ => Err(job.error.unwrap_or_else(|| "export failed".to_string()).into()),
    }
}

fn inspect(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let doc = read_glb(&bytes)?;

    let triangles: usize = doc
        .meshes
        .iter()
        .flat_map(|m| &m.primitives)
        .map(|p| match p.indices {
            Some(i) => doc.accessors[i].count() / 3,
            None => 0,
        })
        .sum();

    println!("{:?} ({} bytes)", path, bytes.len());
    println!("  Scenes: {}", doc.scenes.len());
    println!("  Nodes: {}", doc.nodes.len());
    println!("  Meshes: {} ({} triangles)", doc.meshes.len(), triangles);
    println!("  Materials: {}", doc.materials.len());
    println!("  Textures: {} ({} images)", doc.textures.len(), doc.images.len());
    if !doc.extensions_used.is_empty() {
        println!("  Extensions: {:?}", doc.extensions_used);
    }
    for root in doc.scene_roots() {
        println!("  - {}", doc.nodes[root].name.as_deref().unwrap_or("<unnamed>"));
    }

    Ok(())
}
