//! Video encoding by piping raw RGBA frames into the system `ffmpeg`
//! binary. Using the subprocess rather than native bindings avoids FFmpeg
//! dev header/lib requirements; ffmpeg must be on `PATH`.

use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::config::VideoFormat;
use crate::error::{CelltraceError, CelltraceResult};
use crate::provider::FrameRgba;

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: VideoFormat,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> CelltraceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CelltraceError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(CelltraceError::validation("encode fps must be positive"));
        }
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> CelltraceResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

pub struct VideoEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl VideoEncoder {
    pub fn new(cfg: EncodeConfig) -> CelltraceResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(CelltraceError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(CelltraceError::export(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
        ]);

        match cfg.format {
            VideoFormat::Mp4 => {
                // Canvas extension can make dimensions odd; yuv420p needs
                // them even, so pad rather than reject.
                cmd.args([
                    "-c:v",
                    "libx264",
                    "-vf",
                    "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                    "-pix_fmt",
                    "yuv420p",
                    "-movflags",
                    "+faststart",
                ]);
            }
            VideoFormat::Avi => {
                cmd.args([
                    "-c:v",
                    "mjpeg",
                    "-q:v",
                    "3",
                    "-vf",
                    "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                    "-pix_fmt",
                    "yuvj420p",
                ]);
            }
            VideoFormat::Gif => {
                cmd.args(["-loop", "0"]);
            }
        }
        cmd.arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            CelltraceError::export(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CelltraceError::export("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Self {
            cfg,
            child,
            stdin: Some(stdin),
        })
    }

    pub fn width(&self) -> u32 {
        self.cfg.width
    }

    pub fn height(&self) -> u32 {
        self.cfg.height
    }

    /// Frames must arrive in presentation order and match the configured
    /// dimensions exactly.
    pub fn encode_frame(&mut self, frame: &FrameRgba) -> CelltraceResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(CelltraceError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != self.cfg.width as usize * self.cfg.height as usize * 4 {
            return Err(CelltraceError::validation(
                "frame data size mismatch with width*height*4",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CelltraceError::export("video encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            CelltraceError::export(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    pub fn finish(mut self) -> CelltraceResult<()> {
        drop(self.stdin.take());

        let output = self.child.wait_with_output().map_err(|e| {
            CelltraceError::export(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CelltraceError::export(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_catches_bad_values() {
        let base = EncodeConfig {
            width: 100,
            height: 100,
            fps: 30.0,
            format: VideoFormat::Mp4,
            out_path: PathBuf::from("out.mp4"),
            overwrite: true,
        };
        assert!(base.validate().is_ok());

        assert!(
            EncodeConfig {
                width: 0,
                ..base.clone()
            }
            .validate()
            .is_err()
        );
        assert!(
            EncodeConfig {
                fps: 0.0,
                ..base.clone()
            }
            .validate()
            .is_err()
        );
        assert!(
            EncodeConfig {
                fps: f64::NAN,
                ..base
            }
            .validate()
            .is_err()
        );
    }
}
