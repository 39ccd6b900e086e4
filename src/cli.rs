use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "panoforge")]
#[command(author, version, about = "Panorama derivative builder and GPano metadata tagger")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate missing derivatives and thumbnails, then write the manifest
    Build {
        /// Library root
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Manifest file (defaults to the configured manifest under the root)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,

        /// Leave source metadata out of the manifest
        #[arg(long)]
        no_metadata: bool,

        /// Write a flat image list instead of categories
        #[arg(long)]
        flat: bool,

        /// Show the work list without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Worker threads (overrides the config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show which outputs are missing
    Plan {
        /// Library root
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed a panorama packet into an existing JPEG
    Tag {
        /// JPEG file to tag in place
        #[arg(required = true)]
        file: PathBuf,

        /// Full panorama width (defaults to the image width)
        #[arg(long)]
        width: Option<u32>,

        /// Full panorama height (defaults to the image height)
        #[arg(long)]
        height: Option<u32>,

        /// Packet form: attribute or element
        #[arg(long)]
        form: Option<String>,
    },

    /// List JPEG segments and decode any panorama packet
    Inspect {
        /// JPEG file to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
