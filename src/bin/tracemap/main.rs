//! tracemap CLI - render map tiles and inspect tile cameras.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracemap::camera::CameraProjector;
use tracemap::config::MapConfig;
use tracemap::scene::{decode_geometry, encode_geometry, Geometry, Material, StaticGeometryProvider, WorldRef};
use tracemap::tiles::{
    FileTileStorage, MapTileRenderer, TileKey, TileOutcome, TileQueue, TileWriteCoordinator,
    UpdateLog,
};
use tracemap::util::IVec3;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level: Option<&str> = None;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = Some("debug"),
            "-vv" | "--trace" => level = Some("trace"),
            "-q" | "--quiet" => level = Some("warn"),
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "render" | "r" => cmd_render(&filtered_args[1..]),
        "camera" | "c" => cmd_camera(&filtered_args[1..]),
        "demo-geometry" => cmd_demo_geometry(&filtered_args[1..]),
        "version" | "-V" | "--version" => {
            print_version();
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins unless a verbosity flag was given.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_version() {
    println!(
        "tracemap {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("TRACEMAP_BUILD_DATE")
    );
}

fn print_help() {
    println!("tracemap - path-traced map tiles");
    println!();
    println!("Usage: tracemap [options] <command> [args]");
    println!();
    println!("Commands:");
    println!("  r, render <map.json> <tile-dir> [tx,ty ...] [--geometry <file>]");
    println!("                     Render tiles (default 0,0) into a tile directory");
    println!("  c, camera <tx> <ty> [--config <map.json>] [--zoom <n>]");
    println!("                     Print the camera pose of a tile as JSON");
    println!("  demo-geometry <out.tmgeo>");
    println!("                     Write a small test scene");
    println!("  version            Show version");
    println!("  h, help            Show this help");
    println!();
    println!("Options:");
    println!("  -v, --verbose  Debug output");
    println!("  -vv, --trace   Trace output (very verbose)");
    println!("  -q, --quiet    Warnings and errors only");
    println!();
    println!("RUST_LOG is honoured when no verbosity option is given.");
}

/// Value following `flag`, removing both from `args`.
fn take_option<'a>(args: &mut Vec<&'a str>, flag: &str) -> Result<Option<&'a str>> {
    let Some(i) = args.iter().position(|a| *a == flag) else {
        return Ok(None);
    };
    if i + 1 >= args.len() {
        bail!("{} needs a value", flag);
    }
    let value = args.remove(i + 1);
    args.remove(i);
    Ok(Some(value))
}

fn parse_tile(arg: &str) -> Result<(i32, i32)> {
    let (x, y) = arg.split_once(',').with_context(|| format!("tile must be tx,ty: {arg}"))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

fn cmd_render(args: &[&str]) -> Result<()> {
    let mut args = args.to_vec();
    let geometry_path = take_option(&mut args, "--geometry")?.map(PathBuf::from);
    if args.len() < 2 {
        bail!("usage: tracemap render <map.json> <tile-dir> [tx,ty ...] [--geometry <file>]");
    }
    let config = MapConfig::load(Path::new(args[0]))?;
    let tile_dir = PathBuf::from(args[1]);
    let mut tiles = args[2..].iter().map(|a| parse_tile(a)).collect::<Result<Vec<_>>>()?;
    if tiles.is_empty() {
        tiles.push((0, 0));
    }

    let geometry = match &geometry_path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("cannot read geometry {}", path.display()))?;
            decode_geometry(&bytes)?
        }
        None => {
            info!("no geometry file given, using the demo scene");
            demo_geometry()
        }
    };
    info!(blocks = geometry.len(), materials = geometry.materials().len(), "geometry loaded");

    let world = WorldRef::new(config.world.clone(), tile_dir.join(&config.world))
        .with_dimension(config.dimension);
    let provider = StaticGeometryProvider::new();
    provider.insert(&world.name, world.dimension, geometry);

    let updates = Arc::new(UpdateLog::new());
    let queue = Arc::new(TileQueue::new());
    let coordinator = TileWriteCoordinator::new(
        &world.name,
        &config.name,
        Arc::new(FileTileStorage::new(&tile_dir)),
        updates.clone(),
        queue.clone(),
    )
    .with_requeue(config.requeue_failed_tiles, config.max_requeue_attempts);

    let renderer = MapTileRenderer::new(
        world,
        config.tile_settings(),
        config.projector()?,
        config.build_backend()?,
        Arc::new(provider),
        Arc::new(coordinator),
    )
    .with_template(config.load_template()?)
    .with_textures(config.texture_set());

    for (tx, ty) in tiles {
        queue.enqueue(renderer.key(tx, ty));
    }
    let mut failed: Vec<TileKey> = Vec::new();
    while let Some(key) = queue.pop() {
        match renderer.render_tile(&key) {
            TileOutcome::Updated => println!("{}: updated", key),
            TileOutcome::Unchanged => println!("{}: unchanged", key),
            TileOutcome::Busy => println!("{}: busy", key),
            TileOutcome::Failed(outcome) => {
                println!("{}: failed ({:?})", key, outcome);
                if queue.contains(&key) {
                    continue;
                }
                failed.push(key);
            }
        }
    }

    for update in updates.drain() {
        println!("wrote {}", tile_dir.join(&update.uri).display());
    }
    let stats = renderer.coordinator().statistics().snapshot();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if !failed.is_empty() {
        warn!(count = failed.len(), "some tiles failed");
        bail!("{} tile(s) failed", failed.len());
    }
    Ok(())
}

fn cmd_camera(args: &[&str]) -> Result<()> {
    let mut args = args.to_vec();
    let config = match take_option(&mut args, "--config")? {
        Some(path) => MapConfig::load(Path::new(path))?,
        None => MapConfig::default(),
    };
    let zoom = match take_option(&mut args, "--zoom")? {
        Some(z) => z.parse().context("zoom must be a non-negative integer")?,
        None => config.map_zoom_out,
    };
    if args.len() < 2 {
        bail!("usage: tracemap camera <tx> <ty> [--config <map.json>] [--zoom <n>]");
    }
    let (tx, ty): (i32, i32) = (args[0].parse()?, args[1].parse()?);

    let projector: CameraProjector = config.projector()?;
    let pose = projector.compute_camera(tx, ty, zoom, config.boost_zoom);
    println!("{}", serde_json::to_string_pretty(&pose)?);
    Ok(())
}

fn cmd_demo_geometry(args: &[&str]) -> Result<()> {
    let Some(out) = args.first() else {
        bail!("usage: tracemap demo-geometry <out.tmgeo>");
    };
    let geometry = demo_geometry();
    std::fs::write(out, encode_geometry(&geometry)?)?;
    println!("wrote {} blocks to {}", geometry.len(), out);
    Ok(())
}

/// Grass platform with a stone tower and a lamp, around the origin.
fn demo_geometry() -> Geometry {
    let mut geometry = Geometry::new();
    let grass = geometry.add_material(Material::new("grass_block_top", [0.35, 0.55, 0.2]));
    let dirt = geometry.add_material(Material::new("dirt", [0.45, 0.3, 0.2]));
    let stone = geometry.add_material(Material::new("stone", [0.5, 0.5, 0.5]));
    let lamp = geometry.add_material(Material::new("glowstone", [1.0, 0.85, 0.5]).emissive(1.0));

    geometry.fill(IVec3::new(-48, 58, -48), IVec3::new(48, 61, 48), dirt);
    geometry.fill(IVec3::new(-48, 62, -48), IVec3::new(48, 62, 48), grass);
    geometry.fill(IVec3::new(2, 63, -6), IVec3::new(6, 72, -2), stone);
    geometry.fill(IVec3::new(4, 73, -4), IVec3::new(4, 73, -4), lamp);
    geometry
}
