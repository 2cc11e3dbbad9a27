use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use formats::{HierarchyPackage, MANIFEST_FILE_NAME, content_hash_hex};
use foundation::{FeatureId, LevelId};
use hierarchy::{FeatureCollection, LevelRegistry, find_orphans};
use layers::{ClusterPoint, ClusterStrategy, GridClusterer, RadiusClusterer};
use navigator::{
    ContentCatalog, ControllerConfig, DrillDownController, NoContent, Outcome,
    StaticContentCatalog,
};
use streaming::{FileSource, GeometrySource, GeometryStore, decode_level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and exercise hierarchy packages")]
struct Args {
    /// Package directory containing hierarchy.manifest.json
    #[arg(long, default_value = "data/hierarchy")]
    package: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every level with its feature and skip counts
    Inspect,

    /// Decode every level and audit parent links between consecutive levels
    Validate {
        /// Treat orphan features as errors
        #[arg(long)]
        strict: bool,
    },

    /// Write BLAKE3 content hashes of every level file into the manifest
    Stamp,

    /// Drill down along a path of feature ids and print the final view
    Walk {
        /// Feature ids separated by '/', e.g. HR-S/ST/ST-01
        path: String,

        /// Content index (defaults to content.json in the package when present)
        #[arg(long)]
        content: Option<PathBuf>,
    },

    /// Cluster the full feature set of a level
    Clusters {
        #[arg(long)]
        level: String,

        #[arg(long, default_value_t = 0)]
        resolution: u8,

        /// Use radius clustering with this base radius in degrees instead of the grid
        #[arg(long)]
        radius: Option<f64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("start runtime: {e}"))?;

    match args.command {
        Command::Inspect => runtime.block_on(cmd_inspect(&args.package)),
        Command::Validate { strict } => runtime.block_on(cmd_validate(&args.package, strict)),
        Command::Stamp => cmd_stamp(&args.package),
        Command::Walk { path, content } => {
            runtime.block_on(cmd_walk(&args.package, &path, content.as_deref()))
        }
        Command::Clusters {
            level,
            resolution,
            radius,
        } => runtime.block_on(cmd_clusters(&args.package, &level, resolution, radius)),
    }
}

fn open_package(root: &Path) -> Result<(HierarchyPackage, Arc<LevelRegistry>), String> {
    let package = HierarchyPackage::load(root).map_err(|e| format!("load {root:?}: {e}"))?;
    let registry = LevelRegistry::from_manifest(package.manifest())
        .map_err(|e| format!("invalid hierarchy: {e}"))?;
    Ok((package, Arc::new(registry)))
}

/// Decodes every level in registry order, keeping failures in place.
async fn decode_all(
    package: &HierarchyPackage,
    registry: &LevelRegistry,
) -> Vec<Result<FeatureCollection, String>> {
    let source = FileSource::new(package.root());
    let mut out = Vec::with_capacity(registry.len());
    for level in registry.iter() {
        let decoded = match source.fetch(&level.source).await {
            Ok(bytes) => decode_level(level, &bytes)
                .map(|(collection, report)| {
                    for (index, reason) in &report.skipped {
                        println!("  {}: skipped feature #{index}: {reason:?}", level.id);
                    }
                    collection
                })
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        out.push(decoded);
    }
    out
}

async fn cmd_inspect(root: &Path) -> Result<(), String> {
    let (package, registry) = open_package(root)?;
    let manifest = package.manifest();
    println!(
        "{} ({} levels, manifest {})",
        manifest.name.as_deref().unwrap_or("unnamed hierarchy"),
        registry.len(),
        manifest.version
    );
    if let Some(extent) = manifest.extent_bounds() {
        println!(
            "extent: S {} W {} N {} E {}",
            extent.south, extent.west, extent.north, extent.east
        );
    }

    let decoded = decode_all(&package, &registry).await;
    for (level, result) in registry.iter().zip(decoded) {
        let parent = level.parent_field.as_deref().unwrap_or("-");
        match result {
            Ok(collection) => println!(
                "{:>2} {} ({:?}) parent={} {} features",
                level.ordinal,
                level.id,
                level.kind,
                parent,
                collection.len()
            ),
            Err(e) => println!(
                "{:>2} {} ({:?}) parent={} unavailable: {e}",
                level.ordinal, level.id, level.kind, parent
            ),
        }
    }
    Ok(())
}

async fn cmd_validate(root: &Path, strict: bool) -> Result<(), String> {
    let (package, registry) = open_package(root)?;
    let decoded = decode_all(&package, &registry).await;

    let mut failures = 0usize;
    let mut orphans = 0usize;
    let mut previous: Option<&FeatureCollection> = None;
    for (level, result) in registry.iter().zip(decoded.iter()) {
        match result {
            Ok(collection) => {
                if let Some(parents) = previous {
                    for orphan in find_orphans(collection, parents) {
                        orphans += 1;
                        println!(
                            "{}: orphan {} (parent {})",
                            level.id,
                            orphan.id,
                            orphan.parent.as_ref().map(FeatureId::as_str).unwrap_or("-")
                        );
                    }
                }
                previous = Some(collection);
            }
            Err(e) => {
                failures += 1;
                println!("{}: {e}", level.id);
                previous = None;
            }
        }
    }

    println!("{} levels, {failures} unavailable, {orphans} orphans", registry.len());
    if failures > 0 || (strict && orphans > 0) {
        return Err("validation failed".to_string());
    }
    Ok(())
}

fn cmd_stamp(root: &Path) -> Result<(), String> {
    let (package, _) = open_package(root)?;
    let (dir, mut manifest) = package.into_parts();
    for level in &mut manifest.levels {
        let path = dir.join(&level.path);
        let bytes = fs::read(&path).map_err(|e| format!("read {path:?}: {e}"))?;
        let hash = content_hash_hex(&bytes);
        println!("{} blake3={hash}", level.id);
        level.content_hash = Some(hash);
    }
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| format!("encode manifest: {e}"))?;
    let out = dir.join(MANIFEST_FILE_NAME);
    fs::write(&out, json).map_err(|e| format!("write {out:?}: {e}"))?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

async fn cmd_walk(root: &Path, path: &str, content: Option<&Path>) -> Result<(), String> {
    let (package, registry) = open_package(root)?;
    let content: Arc<dyn ContentCatalog> = match content {
        Some(p) => Arc::new(
            StaticContentCatalog::load(p).map_err(|e| format!("content index {p:?}: {e}"))?,
        ),
        None => match StaticContentCatalog::load(package.root().join("content.json")) {
            Ok(catalog) => Arc::new(catalog),
            Err(_) => Arc::new(NoContent),
        },
    };

    let store = Arc::new(GeometryStore::new(
        registry,
        Arc::new(FileSource::new(package.root())),
    ));
    let config = ControllerConfig {
        extent: package.manifest().extent_bounds(),
        ..ControllerConfig::default()
    };
    let mut nav = DrillDownController::open(store, content, config).await;

    for step in path.split('/').filter(|s| !s.is_empty()) {
        match nav.select_feature(&FeatureId::new(step)).await {
            Ok(Outcome::Leaf(leaf)) => {
                println!(
                    "leaf {} ({}): {} items{}",
                    leaf.feature,
                    leaf.name,
                    leaf.content_count,
                    leaf.content_link
                        .map(|l| format!(" -> {l}"))
                        .unwrap_or_default()
                );
            }
            Ok(_) => {}
            Err(e) => return Err(format!("select {step}: {e}")),
        }
    }

    for event in nav.drain_events() {
        eprintln!("#{} {:?} {}: {}", event.seq, event.kind, event.level, event.message);
    }
    let view = serde_json::to_string_pretty(&nav.snapshot())
        .map_err(|e| format!("encode view: {e}"))?;
    println!("{view}");
    Ok(())
}

async fn cmd_clusters(
    root: &Path,
    level: &str,
    resolution: u8,
    radius: Option<f64>,
) -> Result<(), String> {
    let (package, registry) = open_package(root)?;
    let level_id = LevelId::new(level);
    let store = GeometryStore::new(registry, Arc::new(FileSource::new(package.root())));
    let collection = store
        .load(&level_id)
        .await
        .map_err(|e| format!("load {level_id}: {e}"))?;

    let points: Vec<ClusterPoint> = collection
        .iter()
        .filter_map(ClusterPoint::from_feature)
        .collect();
    let strategy: Box<dyn ClusterStrategy> = match radius {
        Some(r) => Box::new(RadiusClusterer::new(r)),
        None => Box::new(GridClusterer::default()),
    };
    let nodes = strategy.build(&points, resolution);

    println!(
        "{} points -> {} nodes at resolution {resolution} ({strategy:?})",
        points.len(),
        nodes.len()
    );
    for node in &nodes {
        let c = node.centroid();
        let ids: Vec<&str> = node.members().iter().map(|m| m.feature.as_str()).collect();
        println!(
            "{:>10.4} {:>9.4} {:>4}  {}",
            c.lon_deg,
            c.lat_deg,
            node.count(),
            ids.join(",")
        );
    }
    Ok(())
}
