//! Planning: walk, probe, and stat expected outputs.

use super::render::{effective_dimensions, fit_within, probe_source};
use super::walk::walk_sources;
use super::{
    DerivativeScheduler, Failure, FailureKind, OutputState, RunContext, RunEvent, SourceFile,
    SourceWork, ThumbnailPlan, TierPlan, WorkList, THUMBNAIL_DIR,
};
use crate::config::TierSpec;
use anyhow::{bail, Result};
use panoforge_common::paths::flat_output_name;
use panoforge_common::ContentId;
use std::collections::HashMap;
use tracing::{debug, info};

/// Tiers a source of the given width can fill, in the order given.
///
/// A tier wider than the source is never generated.
pub fn select_tiers(tiers: &[TierSpec], source_width: u32) -> Vec<&TierSpec> {
    tiers.iter().filter(|t| t.width <= source_width).collect()
}

impl DerivativeScheduler {
    /// Build the work list for the current state of the tree.
    ///
    /// Only headers are read here; pixel data is decoded in `execute`.
    pub fn plan(&self, ctx: &RunContext) -> Result<WorkList> {
        if !self.root.is_dir() {
            bail!("Library root {:?} is not a directory", self.root);
        }

        let entries = walk_sources(&self.root, &self.skip_dirs, Some(&self.layout.dir));
        info!("Found {} source images under {:?}", entries.len(), self.root);

        let mut work = WorkList::default();
        let mut claimed: HashMap<String, String> = HashMap::new();

        for entry in entries {
            let probed = match probe_source(&entry.absolute_path) {
                Ok(p) => p,
                Err(e) => {
                    let failure = Failure::new(
                        &entry.relative_path,
                        None,
                        FailureKind::DecodeFailure,
                        format!("Cannot read image header: {}", e),
                    );
                    ctx.emit(RunEvent::Failure(failure.clone()));
                    work.excluded.push(failure);
                    continue;
                }
            };

            let file_name = flat_output_name(&entry.relative_path);
            if let Some(owner) = claimed.get(&file_name) {
                let failure = Failure::new(
                    &entry.relative_path,
                    None,
                    FailureKind::WriteFailure,
                    format!("Output name {} is already used by {}", file_name, owner),
                );
                ctx.emit(RunEvent::Failure(failure.clone()));
                work.excluded.push(failure);
                continue;
            }
            claimed.insert(file_name.clone(), entry.relative_path.clone());

            let source = SourceFile {
                content_id: ContentId::from_relative_path(&entry.relative_path),
                relative_path: entry.relative_path,
                absolute_path: entry.absolute_path,
                width: probed.width,
                height: probed.height,
                format: probed.format,
                color_mode: probed.color_mode,
                file_size: probed.file_size,
            };

            let source_work = self.plan_source(source, &file_name);
            debug!(
                source = %source_work.source.relative_path,
                tiers = source_work.tiers.len(),
                pending = source_work.pending(),
                "Planned source"
            );
            work.sources.push(source_work);
        }

        info!(
            "Planned {} sources, {} outputs to generate",
            work.sources.len(),
            work.pending()
        );
        Ok(work)
    }

    fn plan_source(&self, source: SourceFile, file_name: &str) -> SourceWork {
        let (width, height) =
            effective_dimensions(source.width, source.height, self.crop_to_equirectangular);

        let tiers = select_tiers(&self.tiers, width)
            .into_iter()
            .map(|tier| {
                let output_path = self.layout.tier_path(&tier.id, file_name);
                TierPlan {
                    tier: tier.clone(),
                    state: OutputState::of(&output_path),
                    manifest_path: self.layout.manifest_path(&tier.id, file_name),
                    output_path,
                }
            })
            .collect();

        let (thumb_w, thumb_h) = fit_within(
            width,
            height,
            self.thumbnail.max_width,
            self.thumbnail.max_height,
        );
        let output_path = self.layout.thumbnail_path(file_name);
        let thumbnail = ThumbnailPlan {
            width: thumb_w,
            height: thumb_h,
            quality: self.thumbnail.quality,
            state: OutputState::of(&output_path),
            manifest_path: self.layout.manifest_path(THUMBNAIL_DIR, file_name),
            output_path,
        };

        SourceWork {
            source,
            tiers,
            thumbnail,
        }
    }
}
