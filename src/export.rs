//! Concurrent export of rendered frame sequences.
//!
//! One export run drives the renderer across the full sequence on the
//! calling thread (hosts typically dedicate a worker so previews stay
//! responsive), feeds the video encoder synchronously in frame order, and
//! hands finished rasters to a small fixed worker pool for PNG writes.
//! Terminal states are explicit values; no error escapes [`ExportEngine::run`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use crate::config::VideoFormat;
use crate::encode::{EncodeConfig, VideoEncoder};
use crate::error::{CelltraceError, CelltraceResult};
use crate::render::FrameRenderer;

/// Image writes are I/O bound; a small fixed pool is enough to keep the
/// disk busy without unbounded memory growth.
pub const IMAGE_WRITER_THREADS: usize = 4;

#[derive(Clone, Debug)]
pub struct VideoOutput {
    pub path: PathBuf,
    pub format: VideoFormat,
}

#[derive(Clone, Debug)]
pub struct ImageOutput {
    pub directory: PathBuf,
    /// Files are named `{prefix}{frame:06}.png`, 1-based.
    pub prefix: String,
}

#[derive(Clone, Debug)]
pub struct ExportSettings {
    pub frame_count: usize,
    pub output_fps: f64,
    pub video: Option<VideoOutput>,
    pub images: Option<ImageOutput>,
}

/// Reported after every exported frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportProgress {
    pub percent: u32,
    pub frames_done: usize,
    /// Human-readable estimated remaining time, extrapolated from the
    /// running average time per frame; "calculating..." on the first frame.
    pub remaining: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { frames: usize, message: String },
    Cancelled { frames: usize },
    Failed { message: String },
}

impl ExportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExportOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportOutcome::Cancelled { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExportOutcome::Failed { .. })
    }
}

/// Cooperative cancellation flag, checked once per frame-loop iteration.
/// One-way: once set it stays set for the run.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
        tracing::info!("export cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct ExportEngine {
    settings: ExportSettings,
}

impl ExportEngine {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Execute the export. Progress is delivered through `progress` after
    /// every frame; the caller marshals it into its own event model.
    ///
    /// Cancellation exits between frames; image writes already submitted are
    /// still awaited so no partial files are left behind, and the video
    /// container is finalized with the frames written so far.
    pub fn run(
        &self,
        renderer: &mut FrameRenderer<'_>,
        progress: &mut dyn FnMut(ExportProgress),
        cancel: &CancelToken,
    ) -> ExportOutcome {
        match self.run_inner(renderer, progress, cancel) {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("export failed: {e}");
                tracing::error!(%message);
                ExportOutcome::Failed { message }
            }
        }
    }

    fn run_inner(
        &self,
        renderer: &mut FrameRenderer<'_>,
        progress: &mut dyn FnMut(ExportProgress),
        cancel: &CancelToken,
    ) -> CelltraceResult<ExportOutcome> {
        let total = self.settings.frame_count;
        if total == 0 {
            return Ok(ExportOutcome::Failed {
                message: "no frames to export".to_string(),
            });
        }
        if self.settings.video.is_none() && self.settings.images.is_none() {
            return Ok(ExportOutcome::Failed {
                message: "no outputs configured".to_string(),
            });
        }

        if let Some(images) = &self.settings.images {
            std::fs::create_dir_all(&images.directory).map_err(|e| {
                CelltraceError::export(format!(
                    "failed to create image directory '{}': {e}",
                    images.directory.display()
                ))
            })?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(IMAGE_WRITER_THREADS)
            .build()
            .map_err(|e| {
                CelltraceError::export(format!("failed to build image writer pool: {e}"))
            })?;
        let (tx, rx) = mpsc::channel::<CelltraceResult<()>>();
        let mut pending_writes = 0usize;

        let start = Instant::now();
        let mut encoder: Option<VideoEncoder> = None;
        let mut frames_done = 0usize;
        let mut cancelled = false;
        let mut loop_error: Option<CelltraceError> = None;

        tracing::info!(total, "export started");

        for frame_idx in 0..total {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // Export always takes the fidelity-exact path: labels drawn,
            // colorbar area included.
            let frame = match renderer.render_frame(frame_idx, true, true) {
                Ok(frame) => Arc::new(frame),
                Err(e) => {
                    loop_error = Some(e);
                    break;
                }
            };

            if let Some(video) = &self.settings.video {
                if encoder.is_none() {
                    // The first rendered frame fixes the container size.
                    match VideoEncoder::new(EncodeConfig {
                        width: frame.width,
                        height: frame.height,
                        fps: self.settings.output_fps,
                        format: video.format,
                        out_path: video.path.clone(),
                        overwrite: true,
                    }) {
                        Ok(enc) => encoder = Some(enc),
                        Err(e) => {
                            loop_error = Some(e);
                            break;
                        }
                    }
                }
                if let Some(enc) = encoder.as_mut()
                    && let Err(e) = enc.encode_frame(&frame)
                {
                    loop_error = Some(e);
                    break;
                }
            }

            if let Some(images) = &self.settings.images {
                let path = images
                    .directory
                    .join(format!("{}{:06}.png", images.prefix, frame_idx + 1));
                let frame = Arc::clone(&frame);
                let tx = tx.clone();
                pool.spawn(move || {
                    let _ = tx.send(frame.save_png(&path));
                });
                pending_writes += 1;
            }

            frames_done = frame_idx + 1;
            let remaining = if frame_idx > 0 {
                let avg = start.elapsed().as_secs_f64() / frames_done as f64;
                format_duration(avg * (total - frames_done) as f64)
            } else {
                "calculating...".to_string()
            };
            progress(ExportProgress {
                percent: (frames_done * 100 / total) as u32,
                frames_done,
                remaining,
            });
        }

        // Always drain pending image writes, whatever ended the loop; files
        // in flight must land complete.
        drop(tx);
        for _ in 0..pending_writes {
            match rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    loop_error.get_or_insert(e);
                }
                Err(_) => break,
            }
        }

        if let Some(enc) = encoder.take()
            && let Err(e) = enc.finish()
        {
            loop_error.get_or_insert(e);
        }

        if let Some(e) = loop_error {
            return Err(e);
        }

        if cancelled {
            tracing::info!(frames_done, "export cancelled");
            return Ok(ExportOutcome::Cancelled {
                frames: frames_done,
            });
        }

        let message = format!(
            "export completed in {}",
            format_duration(start.elapsed().as_secs_f64())
        );
        tracing::info!(frames_done, %message, "export finished");
        Ok(ExportOutcome::Completed {
            frames: frames_done,
            message,
        })
    }
}

/// `42.3s`, `3:07`, `1:02:09`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0) as u64;
        let secs = (seconds % 60.0) as u64;
        format!("{minutes}:{secs:02}")
    } else {
        let hours = (seconds / 3600.0) as u64;
        let minutes = ((seconds % 3600.0) / 60.0) as u64;
        let secs = (seconds % 60.0) as u64;
        format!("{hours}:{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting_matches_expected_shapes() {
        assert_eq!(format_duration(4.25), "4.2s");
        assert_eq!(format_duration(59.96), "60.0s");
        assert_eq!(format_duration(187.0), "3:07");
        assert_eq!(format_duration(3729.0), "1:02:09");
    }

    #[test]
    fn cancel_token_is_one_way() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
