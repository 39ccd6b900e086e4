//! Per-run context: counters and a structured event sink.
//!
//! The scheduler holds no process-wide state. Everything it reports goes
//! through the [`RunContext`] passed to `plan` and `execute`.

use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Failure, SourceStatus};

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    SourceStarted {
        relative_path: String,
    },
    DerivativeWritten {
        relative_path: String,
        tier_id: String,
        path: PathBuf,
        byte_size: u64,
    },
    DerivativeReused {
        relative_path: String,
        tier_id: String,
    },
    ThumbnailWritten {
        relative_path: String,
        path: PathBuf,
    },
    ImageCropped {
        relative_path: String,
        from: (u32, u32),
        to: (u32, u32),
    },
    Failure(Failure),
    SourceFinished {
        relative_path: String,
        status: SourceStatus,
    },
}

/// Receives run events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RunEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &RunEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RunEvent) {
        match event {
            RunEvent::SourceStarted { relative_path } => {
                debug!(source = %relative_path, "Processing source");
            }
            RunEvent::DerivativeWritten {
                relative_path,
                tier_id,
                path,
                byte_size,
            } => {
                info!(
                    source = %relative_path,
                    tier = %tier_id,
                    bytes = byte_size,
                    "Wrote {}",
                    path.display()
                );
            }
            RunEvent::DerivativeReused {
                relative_path,
                tier_id,
            } => {
                debug!(source = %relative_path, tier = %tier_id, "Derivative already present");
            }
            RunEvent::ThumbnailWritten {
                relative_path,
                path,
            } => {
                info!(source = %relative_path, "Wrote thumbnail {}", path.display());
            }
            RunEvent::ImageCropped {
                relative_path,
                from,
                to,
            } => {
                warn!(
                    source = %relative_path,
                    "Cropped {}x{} to {}x{} for equirectangular output; pixels outside the crop are discarded",
                    from.0, from.1, to.0, to.1
                );
            }
            RunEvent::Failure(failure) => {
                warn!(
                    source = %failure.relative_path,
                    tier = failure.tier_id.as_deref().unwrap_or("-"),
                    kind = %failure.kind,
                    "{}",
                    failure.message
                );
            }
            RunEvent::SourceFinished {
                relative_path,
                status,
            } => {
                debug!(source = %relative_path, status = ?status, "Source finished");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &RunEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Totals for a run.
#[derive(Debug, Default)]
struct RunCounters {
    sources: AtomicUsize,
    derivatives_written: AtomicUsize,
    derivatives_reused: AtomicUsize,
    thumbnails_written: AtomicUsize,
    crops: AtomicUsize,
    warnings: AtomicUsize,
    failures: AtomicUsize,
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub sources: usize,
    pub derivatives_written: usize,
    pub derivatives_reused: usize,
    pub thumbnails_written: usize,
    pub crops: usize,
    pub warnings: usize,
    pub failures: usize,
}

/// Counters plus event sink for one scheduler run.
pub struct RunContext {
    counters: RunCounters,
    sink: Box<dyn EventSink>,
}

impl RunContext {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            counters: RunCounters::default(),
            sink: Box::new(sink),
        }
    }

    /// Record an event and forward it to the sink.
    pub fn emit(&self, event: RunEvent) {
        let counter = match &event {
            RunEvent::SourceStarted { .. } => Some(&self.counters.sources),
            RunEvent::DerivativeWritten { .. } => Some(&self.counters.derivatives_written),
            RunEvent::DerivativeReused { .. } => Some(&self.counters.derivatives_reused),
            RunEvent::ThumbnailWritten { .. } => Some(&self.counters.thumbnails_written),
            RunEvent::ImageCropped { .. } => Some(&self.counters.crops),
            RunEvent::Failure(f) if f.kind.is_warning() => Some(&self.counters.warnings),
            RunEvent::Failure(_) => Some(&self.counters.failures),
            RunEvent::SourceFinished { .. } => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        self.sink.emit(&event);
    }

    pub fn counters(&self) -> CounterSnapshot {
        let c = &self.counters;
        CounterSnapshot {
            sources: c.sources.load(Ordering::Relaxed),
            derivatives_written: c.derivatives_written.load(Ordering::Relaxed),
            derivatives_reused: c.derivatives_reused.load(Ordering::Relaxed),
            thumbnails_written: c.thumbnails_written.load(Ordering::Relaxed),
            crops: c.crops.load(Ordering::Relaxed),
            warnings: c.warnings.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("counters", &self.counters())
            .finish_non_exhaustive()
    }
}
