//! weblayer-viewer: drive a layer tree over a JSON scene.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use viewer::{SceneFile, Viewer, ViewerOptions};
use weblayer::{LayerConfig, Ray};

/// Headless layer tree viewer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene description (JSON)
    scene: PathBuf,

    /// Layer configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames to run
    #[arg(long, default_value = "60")]
    frames: u32,

    /// Interpolation factor per frame
    #[arg(long, default_value = "0.2")]
    lerp: f32,

    /// Device pixel ratio, overrides the configuration
    #[arg(long)]
    pixel_ratio: Option<f32>,

    /// Interaction ray through `x,y` pointing down -Z (world units)
    #[arg(long, value_parser = parse_ray, allow_hyphen_values = true)]
    ray: Vec<Ray>,

    /// Drain with an idle deadline of this many milliseconds per frame
    #[arg(long)]
    idle_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the final layer tree as JSON
    #[arg(long)]
    dump: bool,

    /// Write layer textures as PNG into this directory
    #[arg(long)]
    png: Option<PathBuf>,
}

fn parse_ray(value: &str) -> Result<Ray, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{value}`"))?;
    let x: f32 = x.trim().parse().map_err(|e| format!("bad x: {e}"))?;
    let y: f32 = y.trim().parse().map_err(|e| format!("bad y: {e}"))?;
    Ok(Ray::toward_negative_z(x, y, 10.0))
}

fn load_config(args: &Args) -> Result<LayerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => LayerConfig::default(),
    };
    if let Some(ratio) = args.pixel_ratio {
        config.pixel_ratio = ratio;
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env()
        .add_directive(LevelFilter::from_level(log_level).into());
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("weblayer-viewer v{}", viewer::VERSION);

    let file = SceneFile::load(&args.scene)?;
    let scene = file.build(args.scene.parent())?;
    let config = load_config(&args)?;

    let mut viewer = Viewer::new(scene, config)?;
    let options = ViewerOptions {
        frames: args.frames,
        lerp: args.lerp,
        rays: args.ray.clone(),
        idle_budget: args.idle_ms.map(Duration::from_millis),
    };
    viewer.run(&options).await?;

    if args.dump {
        let snapshot = viewer.snapshot()?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    if let Some(dir) = &args.png {
        viewer.export_textures(dir)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::parse_from(["weblayer-viewer", "scene.json"]);
        assert_eq!(args.scene, PathBuf::from("scene.json"));
        assert_eq!(args.frames, 60);
        assert!(args.ray.is_empty());
        assert!(!args.dump);
    }

    #[test]
    fn test_args_rays() {
        let args = Args::parse_from([
            "weblayer-viewer",
            "scene.json",
            "--ray",
            "0.1,-0.2",
            "--ray",
            "0.3, 0.4",
        ]);
        assert_eq!(args.ray.len(), 2);
        assert_eq!(args.ray[0].origin.x, 0.1);
        assert_eq!(args.ray[1].origin.y, 0.4);
    }

    #[test]
    fn test_bad_ray() {
        assert!(parse_ray("1.0").is_err());
        assert!(parse_ray("a,b").is_err());
    }

    #[test]
    fn test_pixel_ratio_override() {
        let args = Args::parse_from(["weblayer-viewer", "scene.json", "--pixel-ratio", "2"]);
        assert_eq!(load_config(&args).unwrap().pixel_ratio, 2.0);
    }
}
