//! Execution: decode once, render every missing output, embed and verify.

use super::render::{encode_jpeg, equirect_crop_rect, flatten_alpha, resize_to};
use super::{
    DerivativeRecord, DerivativeScheduler, Failure, FailureKind, ManifestRecord, OutputState,
    RunContext, RunEvent, RunReport, SourceOutcome, SourceStatus, SourceWork, ThumbnailRecord,
    WorkList,
};
use image::DynamicImage;
use panoforge_common::fs::write_atomic;
use panoforge_jpeg::{embed, verify_file, PanoramaPacket};
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// What one source produced.
struct SourceResult {
    record: Option<ManifestRecord>,
    outcome: SourceOutcome,
    failures: Vec<Failure>,
}

/// A written output and the warnings raised while writing it.
struct Written {
    byte_size: u64,
    warnings: Vec<Failure>,
}

/// Dimensions and destination of one output.
struct OutputTarget<'a> {
    label: &'a str,
    width: u32,
    height: u32,
    quality: u8,
    path: &'a Path,
}

impl SourceStatus {
    /// Status implied by a source's failures and warnings.
    pub fn from_failures(failures: &[Failure]) -> Self {
        if failures.iter().any(|f| f.kind == FailureKind::DecodeFailure) {
            Self::DecodeFailure
        } else if failures.iter().any(|f| !f.kind.is_warning()) {
            Self::PartialTierFailure
        } else if !failures.is_empty() {
            Self::VerificationFailure
        } else {
            Self::Success
        }
    }
}

impl DerivativeScheduler {
    /// Generate every missing output in `work`.
    ///
    /// Per-file failures are collected in the report; this never fails as a
    /// whole. With `workers > 1` sources are spread across a thread pool, one
    /// source per task, and results are merged in work-list order.
    pub fn execute(&self, work: WorkList, ctx: &RunContext) -> RunReport {
        let results = self.process_all(&work.sources, ctx);

        let mut report = RunReport::default();
        for failure in &work.excluded {
            report.outcomes.push(SourceOutcome {
                relative_path: failure.relative_path.clone(),
                status: SourceStatus::from_failures(std::slice::from_ref(failure)),
            });
        }
        report.failures = work.excluded;

        for result in results {
            report.records.extend(result.record);
            report.outcomes.push(result.outcome);
            report.failures.extend(result.failures);
        }
        report
            .outcomes
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        report.counters = ctx.counters();

        info!(
            "Run finished: {} sources, {} written, {} reused, {} failures",
            report.outcomes.len(),
            report.counters.derivatives_written + report.counters.thumbnails_written,
            report.counters.derivatives_reused,
            report.failures.len()
        );
        report
    }

    fn process_all(&self, sources: &[SourceWork], ctx: &RunContext) -> Vec<SourceResult> {
        if self.workers > 1 && sources.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
            {
                Ok(pool) => {
                    return pool.install(|| {
                        sources
                            .par_iter()
                            .map(|s| self.process_source(s, ctx))
                            .collect()
                    });
                }
                Err(e) => warn!("Cannot start worker pool, running sequentially: {}", e),
            }
        }
        sources
            .iter()
            .map(|s| self.process_source(s, ctx))
            .collect()
    }

    fn process_source(&self, work: &SourceWork, ctx: &RunContext) -> SourceResult {
        let rel = &work.source.relative_path;
        ctx.emit(RunEvent::SourceStarted {
            relative_path: rel.clone(),
        });

        let mut failures = Vec::new();
        let mut derivatives = Vec::new();
        let mut thumbnail = None;

        // Sources with nothing missing are never decoded
        let image = if work.has_pending() {
            match self.load(work, ctx) {
                Ok(img) => Some(img),
                Err(failure) => {
                    ctx.emit(RunEvent::Failure(failure.clone()));
                    return self.finish(work, None, vec![failure], ctx);
                }
            }
        } else {
            None
        };

        for plan in &work.tiers {
            let byte_size = match (plan.state, &image) {
                (OutputState::Present { byte_size }, _) => {
                    ctx.emit(RunEvent::DerivativeReused {
                        relative_path: rel.clone(),
                        tier_id: plan.tier.id.clone(),
                    });
                    Some(byte_size)
                }
                (OutputState::Missing, Some(img)) => {
                    let target = OutputTarget {
                        label: &plan.tier.id,
                        width: plan.tier.width,
                        height: plan.tier.height,
                        quality: plan.tier.quality,
                        path: &plan.output_path,
                    };
                    match self.write_output(rel, img, &target) {
                        Ok(written) => {
                            ctx.emit(RunEvent::DerivativeWritten {
                                relative_path: rel.clone(),
                                tier_id: plan.tier.id.clone(),
                                path: plan.output_path.clone(),
                                byte_size: written.byte_size,
                            });
                            record_all(ctx, &mut failures, written.warnings);
                            Some(written.byte_size)
                        }
                        Err(failure) => {
                            record_all(ctx, &mut failures, vec![failure]);
                            None
                        }
                    }
                }
                (OutputState::Missing, None) => None,
            };

            if let Some(byte_size) = byte_size {
                derivatives.push(DerivativeRecord {
                    tier_id: plan.tier.id.clone(),
                    width: plan.tier.width,
                    height: plan.tier.height,
                    output_path: plan.manifest_path.clone(),
                    byte_size,
                });
            }
        }

        let thumb = &work.thumbnail;
        let thumb_ok = match (thumb.state, &image) {
            (OutputState::Present { .. }, _) => true,
            (OutputState::Missing, Some(img)) => {
                let target = OutputTarget {
                    label: "thumbnail",
                    width: thumb.width,
                    height: thumb.height,
                    quality: thumb.quality,
                    path: &thumb.output_path,
                };
                match self.write_output(rel, img, &target) {
                    Ok(written) => {
                        ctx.emit(RunEvent::ThumbnailWritten {
                            relative_path: rel.clone(),
                            path: thumb.output_path.clone(),
                        });
                        record_all(ctx, &mut failures, written.warnings);
                        true
                    }
                    Err(failure) => {
                        record_all(ctx, &mut failures, vec![failure]);
                        false
                    }
                }
            }
            (OutputState::Missing, None) => false,
        };
        if thumb_ok {
            thumbnail = Some(ThumbnailRecord {
                path: thumb.manifest_path.clone(),
                width: thumb.width,
                height: thumb.height,
            });
        }

        let record = ManifestRecord {
            content_id: work.source.content_id.clone(),
            relative_path: rel.clone(),
            thumbnail,
            derivatives,
            source: work.source.clone(),
        };
        self.finish(work, Some(record), failures, ctx)
    }

    fn finish(
        &self,
        work: &SourceWork,
        record: Option<ManifestRecord>,
        failures: Vec<Failure>,
        ctx: &RunContext,
    ) -> SourceResult {
        let status = SourceStatus::from_failures(&failures);
        ctx.emit(RunEvent::SourceFinished {
            relative_path: work.source.relative_path.clone(),
            status,
        });
        SourceResult {
            record,
            outcome: SourceOutcome {
                relative_path: work.source.relative_path.clone(),
                status,
            },
            failures,
        }
    }

    /// Decode, crop to 2:1 if enabled, and drop alpha.
    fn load(&self, work: &SourceWork, ctx: &RunContext) -> Result<DynamicImage, Failure> {
        let rel = &work.source.relative_path;
        let mut img = image::open(&work.source.absolute_path).map_err(|e| {
            Failure::new(
                rel,
                None,
                FailureKind::DecodeFailure,
                format!("Cannot decode image: {}", e),
            )
        })?;

        if self.crop_to_equirectangular {
            if let Some((x, y, w, h)) = equirect_crop_rect(img.width(), img.height()) {
                ctx.emit(RunEvent::ImageCropped {
                    relative_path: rel.clone(),
                    from: (img.width(), img.height()),
                    to: (w, h),
                });
                img = img.crop_imm(x, y, w, h);
            }
        }

        Ok(flatten_alpha(img))
    }

    /// Resize, encode, embed the packet in memory, write atomically, verify.
    ///
    /// `Err` means the output was not written. A packet that does not fit
    /// still writes the file without metadata and returns a warning.
    fn write_output(
        &self,
        rel: &str,
        img: &DynamicImage,
        target: &OutputTarget<'_>,
    ) -> Result<Written, Failure> {
        let fail = |kind, message: String| Failure::new(rel, Some(target.label), kind, message);

        let resized = resize_to(img, target.width, target.height);
        let encoded = encode_jpeg(&resized, target.quality)
            .map_err(|e| fail(FailureKind::WriteFailure, format!("Encode failed: {}", e)))?;

        let packet = PanoramaPacket::equirectangular(target.width, target.height);
        let mut warnings = Vec::new();
        let (bytes, embedded) = match embed(&encoded, &packet.to_bytes(self.packet_form)) {
            Ok(bytes) => (bytes, true),
            Err(e @ panoforge_jpeg::Error::PacketTooLarge { .. }) => {
                warnings.push(fail(FailureKind::PacketTooLarge, e.to_string()));
                (encoded, false)
            }
            Err(e) => return Err(fail(FailureKind::MalformedContainer, e.to_string())),
        };

        write_atomic(target.path, &bytes).map_err(|e| {
            fail(
                FailureKind::WriteFailure,
                format!("Cannot write {}: {}", target.path.display(), e),
            )
        })?;

        if embedded {
            if let Err(e) = verify_file(target.path, &packet) {
                warnings.push(fail(FailureKind::VerificationFailed, e.to_string()));
            }
        }

        Ok(Written {
            byte_size: bytes.len() as u64,
            warnings,
        })
    }
}

fn record_all(ctx: &RunContext, failures: &mut Vec<Failure>, new: Vec<Failure>) {
    for failure in new {
        ctx.emit(RunEvent::Failure(failure.clone()));
        failures.push(failure);
    }
}
