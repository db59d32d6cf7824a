//! ffmpeg-backed conversions for the `/gif` reply command.
//!
//! Every conversion writes to a fresh request-scoped output path; the
//! transcoder is invoked through the external-command abstraction with a
//! hard timeout and forced kill.

use crate::config::CONVERT_TIMEOUT_SECS;
use crate::fetch::command::{CommandError, ExternalCommand};
use crate::scratch::{self, Scratch};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Conversion failure.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The transcoder could not be run or timed out
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The transcoder ran but produced no usable output
    #[error("conversion failed: {0}")]
    Failed(String),
    /// Scratch file handling failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// ffmpeg-backed converter writing into its own scratch space.
pub struct Converter {
    scratch: Scratch,
    ffmpeg: String,
}

impl Converter {
    /// Build a converter rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch: Scratch::new(dir),
            ffmpeg: "ffmpeg".to_string(),
        }
    }

    /// Turn a still image into a one-second looping mp4 (what the platform
    /// renders as a GIF). The temporary frame file is removed before
    /// returning; the output is the caller's to release.
    ///
    /// # Errors
    ///
    /// Returns a [`ConvertError`] when the transcoder fails, times out or
    /// produces no output file.
    pub async fn image_to_looping_mp4(&self, image: &[u8]) -> Result<PathBuf, ConvertError> {
        self.scratch.ensure().await?;
        let frame = self.scratch.unique_file("frame", "png");
        let output = self.scratch.unique_file("loop", "mp4");
        tokio::fs::write(&frame, image).await?;

        let result = self
            .run_ffmpeg(&[
                "-loop",
                "1",
                "-i",
                &frame.to_string_lossy(),
                "-c:v",
                "libx264",
                "-t",
                "1",
                "-pix_fmt",
                "yuv420p",
                &output.to_string_lossy(),
            ])
            .await;

        scratch::release_file(&frame).await;
        result?;

        self.expect_output(&output).await?;
        info!(path = %output.display(), "Image converted to looping mp4");
        Ok(output)
    }

    /// Convert an mp4 into a GIF. The input file is left for the caller to
    /// release along with the returned output.
    ///
    /// # Errors
    ///
    /// Returns a [`ConvertError`] when the transcoder fails, times out or
    /// produces no output file.
    pub async fn video_to_gif(&self, video_path: &Path) -> Result<PathBuf, ConvertError> {
        self.scratch.ensure().await?;
        let output = self.scratch.unique_file("anim", "gif");

        self.run_ffmpeg(&[
            "-y",
            "-i",
            &video_path.to_string_lossy(),
            "-vf",
            "fps=10,scale=320:-1:flags=lanczos",
            "-gifflags",
            "+transdiff",
            "-pix_fmt",
            "rgba",
            "-f",
            "gif",
            &output.to_string_lossy(),
        ])
        .await?;

        self.expect_output(&output).await?;
        info!(path = %output.display(), "Video converted to gif");
        Ok(output)
    }

    /// A fresh scratch file for caller-managed intermediates (e.g. a video
    /// fetched from the platform before conversion).
    #[must_use]
    pub fn scratch_file(&self, prefix: &str, extension: &str) -> PathBuf {
        self.scratch.unique_file(prefix, extension)
    }

    /// Make sure the scratch root exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        self.scratch.ensure().await
    }

    async fn run_ffmpeg(&self, args: &[&str]) -> Result<(), ConvertError> {
        let output = ExternalCommand::new(&self.ffmpeg)
            .args(args.iter().copied())
            .timeout(Duration::from_secs(CONVERT_TIMEOUT_SECS))
            .run()
            .await?;
        if !output.success {
            warn!(code = ?output.code, stderr = %output.stderr.trim(), "ffmpeg failed");
            return Err(ConvertError::Failed(format!(
                "ffmpeg exited with {:?}",
                output.code
            )));
        }
        Ok(())
    }

    async fn expect_output(&self, path: &Path) -> Result<(), ConvertError> {
        if tokio::fs::try_exists(path).await? {
            Ok(())
        } else {
            Err(ConvertError::Failed(format!(
                "transcoder produced no file at {}",
                path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_outputs_are_unique_per_request() {
        let converter = Converter::new("convert-test");
        let a = converter.scratch_file("loop", "mp4");
        let b = converter.scratch_file("loop", "mp4");
        assert_ne!(a, b);
    }
}
