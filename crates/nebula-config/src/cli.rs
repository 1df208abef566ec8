//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Globe demo command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula-globe", about = "Headless quadtree LOD globe demo")]
pub struct CliArgs {
    /// Maximum screen-space error in pixels.
    #[arg(long)]
    pub max_sse: Option<f64>,

    /// Loading descendant limit.
    #[arg(long)]
    pub loading_descendant_limit: Option<usize>,

    /// Preload ancestors of rendered tiles.
    #[arg(long)]
    pub preload_ancestors: Option<bool>,

    /// Preload culled siblings of visible tiles.
    #[arg(long)]
    pub preload_siblings: Option<bool>,

    /// Log selection statistics whenever they change.
    #[arg(long)]
    pub debug_output: Option<bool>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(sse) = args.max_sse {
            self.quadtree.maximum_screen_space_error = sse;
        }
        if let Some(limit) = args.loading_descendant_limit {
            self.quadtree.loading_descendant_limit = limit;
        }
        if let Some(preload) = args.preload_ancestors {
            self.quadtree.preload_ancestors = preload;
        }
        if let Some(preload) = args.preload_siblings {
            self.quadtree.preload_siblings = preload;
        }
        if let Some(debug_output) = args.debug_output {
            self.quadtree.debug_output = debug_output;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
