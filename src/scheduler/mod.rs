//! Incremental derivative builder.
//!
//! The scheduler walks a library of panorama sources and produces, for each
//! source, one JPEG per configured tier plus a thumbnail, each carrying an
//! embedded GPano packet.
//!
//! Work is split in two phases:
//!
//! 1. [`DerivativeScheduler::plan`] walks the tree, reads each source's header,
//!    and stats every expected output. Outputs already on disk are reused; the
//!    rest form the work list. Nothing is cached between runs, so an unchanged
//!    tree plans to an empty work list.
//! 2. [`DerivativeScheduler::execute`] decodes each source with pending work
//!    once, renders every missing output from that decoded image, writes it
//!    atomically, embeds metadata, and verifies the result from disk.
//!
//! Failures are scoped to a single file and collected in the [`RunReport`];
//! they never abort the batch.

mod context;
mod execute;
mod plan;
pub mod render;
mod walk;

pub use context::{CounterSnapshot, EventSink, MemorySink, RunContext, RunEvent, TracingSink};
pub use plan::select_tiers;
pub use walk::{walk_sources, SourceEntry};

use crate::config::{Config, ThumbnailSpec, TierSpec};
use panoforge_common::paths::to_slash_path;
use panoforge_common::ContentId;
use panoforge_jpeg::PacketForm;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Name of the thumbnail directory under the output root.
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// A source image discovered by the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub relative_path: String,
    pub content_id: ContentId,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    /// Decoded width before any crop
    pub width: u32,
    /// Decoded height before any crop
    pub height: u32,
    /// Container format name ("JPEG", "PNG")
    pub format: Option<String>,
    /// Color layout ("RGB", "RGBA", "L")
    pub color_mode: String,
    pub file_size: u64,
}

impl SourceFile {
    pub fn is_panorama(&self) -> bool {
        self.height > 0 && self.width as f64 / self.height as f64 >= 1.8
    }
}

/// Whether an expected output already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Present { byte_size: u64 },
    Missing,
}

impl OutputState {
    /// Stat `path`; anything that is not a readable regular file counts as missing.
    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Self::Present {
                byte_size: meta.len(),
            },
            _ => Self::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// One tier output for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPlan {
    pub tier: TierSpec,
    pub output_path: PathBuf,
    /// Path as written to the manifest
    pub manifest_path: String,
    pub state: OutputState,
}

/// The thumbnail output for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailPlan {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub output_path: PathBuf,
    pub manifest_path: String,
    pub state: OutputState,
}

/// Everything planned for one source, present and missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceWork {
    pub source: SourceFile,
    /// Tiers that fit the source, widest first
    pub tiers: Vec<TierPlan>,
    pub thumbnail: ThumbnailPlan,
}

impl SourceWork {
    /// Number of outputs that must be generated.
    pub fn pending(&self) -> usize {
        self.tiers.iter().filter(|t| t.state.is_missing()).count()
            + usize::from(self.thumbnail.state.is_missing())
    }

    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }
}

/// Result of planning a run.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    /// Every usable source in relative-path order
    pub sources: Vec<SourceWork>,
    /// Sources dropped during planning
    pub excluded: Vec<Failure>,
}

impl WorkList {
    /// Total outputs to generate.
    pub fn pending(&self) -> usize {
        self.sources.iter().map(SourceWork::pending).sum()
    }

    /// True when no output needs to be generated.
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Sources with at least one missing output.
    pub fn pending_sources(&self) -> impl Iterator<Item = &SourceWork> {
        self.sources.iter().filter(|s| s.has_pending())
    }
}

/// Error classes, all scoped to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// Unparseable JPEG structure
    MalformedContainer,
    /// Packet exceeds the 16-bit segment length; output kept without metadata
    PacketTooLarge,
    /// Re-read did not confirm the packet; output kept
    VerificationFailed,
    /// Source unreadable; excluded from the manifest
    DecodeFailure,
    /// Encode or disk error; that output omitted
    WriteFailure,
}

impl FailureKind {
    /// Warnings leave the output in place.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::PacketTooLarge | Self::VerificationFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedContainer => "MalformedContainer",
            Self::PacketTooLarge => "PacketTooLarge",
            Self::VerificationFailed => "VerificationFailed",
            Self::DecodeFailure => "DecodeFailure",
            Self::WriteFailure => "WriteFailure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file-scoped failure or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub relative_path: String,
    /// Tier id, "thumbnail", or `None` for the whole source
    pub tier_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(
        relative_path: impl Into<String>,
        tier_id: Option<&str>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            tier_id: tier_id.map(str::to_string),
            kind,
            message: message.into(),
        }
    }
}

/// Per-source outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceStatus {
    Success,
    DecodeFailure,
    PartialTierFailure,
    VerificationFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub relative_path: String,
    pub status: SourceStatus,
}

/// A derivative listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivativeRecord {
    pub tier_id: String,
    pub width: u32,
    pub height: u32,
    pub output_path: String,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailRecord {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

/// Everything the manifest needs about one processed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    pub content_id: ContentId,
    pub relative_path: String,
    pub thumbnail: Option<ThumbnailRecord>,
    pub derivatives: Vec<DerivativeRecord>,
    pub source: SourceFile,
}

/// Outcome of [`DerivativeScheduler::execute`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Manifest records in relative-path order; decode failures are absent
    pub records: Vec<ManifestRecord>,
    pub outcomes: Vec<SourceOutcome>,
    /// Planning exclusions followed by per-source failures and warnings
    pub failures: Vec<Failure>,
    pub counters: CounterSnapshot,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Count of outcomes with the given status.
    pub fn count(&self, status: SourceStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Where outputs go and how they are named in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Absolute (or root-joined) output directory
    pub dir: PathBuf,
    /// Prefix for manifest paths, `/`-separated
    pub manifest_prefix: String,
}

impl OutputLayout {
    pub fn new(root: &Path, output_dir: &Path) -> Self {
        let dir = root.join(output_dir);
        let manifest_prefix = if output_dir.is_absolute() {
            output_dir.to_string_lossy().replace('\\', "/")
        } else {
            to_slash_path(output_dir)
        };
        Self {
            dir,
            manifest_prefix,
        }
    }

    pub fn tier_path(&self, tier_id: &str, file_name: &str) -> PathBuf {
        self.dir.join(tier_id).join(file_name)
    }

    pub fn thumbnail_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(THUMBNAIL_DIR).join(file_name)
    }

    pub fn manifest_path(&self, subdir: &str, file_name: &str) -> String {
        if self.manifest_prefix.is_empty() {
            format!("{}/{}", subdir, file_name)
        } else {
            format!("{}/{}/{}", self.manifest_prefix, subdir, file_name)
        }
    }
}

/// Plans and executes derivative generation for one library root.
#[derive(Debug, Clone)]
pub struct DerivativeScheduler {
    root: PathBuf,
    layout: OutputLayout,
    /// Sorted widest first
    tiers: Vec<TierSpec>,
    thumbnail: ThumbnailSpec,
    skip_dirs: Vec<String>,
    packet_form: PacketForm,
    crop_to_equirectangular: bool,
    workers: usize,
}

impl DerivativeScheduler {
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
        let root = root.into();
        let layout = OutputLayout::new(&root, &config.output_dir);

        let mut tiers = config.tiers.clone();
        tiers.sort_by(|a, b| b.width.cmp(&a.width));

        Self {
            root,
            layout,
            tiers,
            thumbnail: config.thumbnail,
            skip_dirs: config.skip_dirs.clone(),
            packet_form: config.packet_form.into(),
            crop_to_equirectangular: config.crop_to_equirectangular,
            workers: config.workers.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Configured tiers, widest first.
    pub fn tiers(&self) -> &[TierSpec] {
        &self.tiers
    }

    /// Plan and execute in one call.
    pub fn run(&self, ctx: &RunContext) -> anyhow::Result<RunReport> {
        let work = self.plan(ctx)?;
        Ok(self.execute(work, ctx))
    }
}
