//! Audio-track backend.
//!
//! Shells out to the external audio-fetch tool with a playlist of fallback
//! sources, working inside a fresh per-request scratch directory. After the
//! tool exits there must be exactly one produced audio file; zero or several
//! candidates is an ambiguous result.

use crate::config::AUDIO_SUBPROCESS_TIMEOUT_SECS;
use crate::fetch::command::{CommandError, ExternalCommand};
use crate::fetch::{Acquired, AcquisitionError};
use crate::scratch::Scratch;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Backend for audio tracks.
pub struct AudioTrackBackend {
    tool: String,
    sources: Vec<String>,
    scratch: Scratch,
}

impl AudioTrackBackend {
    /// Build the backend.
    #[must_use]
    pub fn new(tool: String, sources: Vec<String>, scratch: Scratch) -> Self {
        Self {
            tool,
            sources,
            scratch,
        }
    }

    /// Fetch the track behind `link`.
    ///
    /// # Errors
    ///
    /// `BackendTimeout` when the tool exceeds its budget, `BackendRejected`
    /// on a non-zero exit, `LocalIo` when the output directory does not
    /// contain exactly one audio file.
    pub async fn fetch(&self, link: &str) -> Result<Acquired, AcquisitionError> {
        self.scratch.ensure().await?;
        let dir = self.scratch.unique_dir("track").await?;
        info!(link, tool = %self.tool, dir = %dir.display(), "Fetching audio track");

        let mut command = ExternalCommand::new(&self.tool)
            .arg(link)
            .current_dir(&dir)
            .timeout(Duration::from_secs(AUDIO_SUBPROCESS_TIMEOUT_SECS));
        if !self.sources.is_empty() {
            command = command.arg("--audio").args(self.sources.iter().cloned());
        }

        let output = match command.run().await {
            Ok(output) => output,
            Err(CommandError::Timeout { .. }) => return Err(AcquisitionError::BackendTimeout),
            Err(CommandError::Io { source, .. }) => {
                return Err(AcquisitionError::LocalIo(source))
            }
        };

        if !output.success {
            warn!(
                link,
                code = ?output.code,
                stderr = %output.stderr.trim(),
                "Audio-fetch tool failed"
            );
            return Err(AcquisitionError::BackendRejected(format!(
                "audio tool exited with {:?}",
                output.code
            )));
        }

        let local_path = locate_single_audio_file(&dir).await?;
        info!(link, path = %local_path.display(), "Audio track downloaded");
        Ok(Acquired::Audio { local_path })
    }
}

/// Find the single `.mp3` the tool produced.
///
/// Zero or more than one candidate means the result is ambiguous and is
/// reported as a local I/O failure.
async fn locate_single_audio_file(dir: &std::path::Path) -> Result<PathBuf, AcquisitionError> {
    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_mp3 = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mp3"));
        if is_mp3 {
            candidates.push(path);
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        n => Err(AcquisitionError::LocalIo(std::io::Error::other(format!(
            "expected exactly one audio file in {}, found {n}",
            dir.display()
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locate_single_audio_file() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;

        // Empty directory is ambiguous
        assert!(matches!(
            locate_single_audio_file(tmp.path()).await,
            Err(AcquisitionError::LocalIo(_))
        ));

        // Exactly one candidate wins; unrelated files are ignored
        tokio::fs::write(tmp.path().join("cover.jpg"), b"x").await?;
        tokio::fs::write(tmp.path().join("song.mp3"), b"x").await?;
        let found = locate_single_audio_file(tmp.path()).await?;
        assert_eq!(
            found.file_name().and_then(|n| n.to_str()),
            Some("song.mp3")
        );

        // Two candidates are ambiguous again
        tokio::fs::write(tmp.path().join("other.MP3"), b"x").await?;
        assert!(matches!(
            locate_single_audio_file(tmp.path()).await,
            Err(AcquisitionError::LocalIo(_))
        ));
        Ok(())
    }
}
