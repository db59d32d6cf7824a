//! End-to-end pipeline tests over recording test doubles: batch flush
//! shapes, cleanup guarantees and the full text-to-delivery scenario.

use async_trait::async_trait;
use media_courier::bot::gateway::{DeliveryError, MediaGateway, PhotoReceipt};
use media_courier::fetch::{Acquired, AcquisitionError, Acquirer};
use media_courier::links::{ContentKind, LinkResolver};
use media_courier::pipeline::{self, PipelineDeps};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use teloxide::types::{ChatId, MessageId};

const CHAT: ChatId = ChatId(7);

/// Records every outbound operation instead of talking to a platform.
#[derive(Default)]
struct RecordingGateway {
    photo_uploads: Mutex<Vec<PathBuf>>,
    group_sends: Mutex<Vec<usize>>,
    deletes: Mutex<Vec<i32>>,
    videos: Mutex<Vec<PathBuf>>,
    audios: Mutex<Vec<PathBuf>>,
    texts: Mutex<Vec<String>>,
    fail_video_sends: bool,
    next_id: AtomicI32,
}

impl RecordingGateway {
    fn failing_video() -> Self {
        Self {
            fail_video_sends: true,
            ..Self::default()
        }
    }

    fn group_sizes(&self) -> Vec<usize> {
        self.group_sends.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn upload_count(&self) -> usize {
        self.photo_uploads.lock().map(|u| u.len()).unwrap_or(0)
    }

    fn delete_count(&self) -> usize {
        self.deletes.lock().map(|d| d.len()).unwrap_or(0)
    }

    fn video_count(&self) -> usize {
        self.videos.lock().map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MediaGateway for RecordingGateway {
    async fn send_text(&self, _chat: ChatId, text: &str) -> Result<(), DeliveryError> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        Ok(())
    }

    async fn send_html(&self, chat: ChatId, html: &str) -> Result<(), DeliveryError> {
        self.send_text(chat, html).await
    }

    async fn send_photo(&self, _chat: ChatId, path: &Path) -> Result<PhotoReceipt, DeliveryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut uploads) = self.photo_uploads.lock() {
            uploads.push(path.to_path_buf());
        }
        Ok(PhotoReceipt {
            remote_ref: format!("ref-{id}"),
            message_id: MessageId(id),
        })
    }

    async fn send_video(&self, _chat: ChatId, path: &Path) -> Result<(), DeliveryError> {
        if self.fail_video_sends {
            return Err(DeliveryError::TransportFailure("simulated".to_string()));
        }
        if let Ok(mut videos) = self.videos.lock() {
            videos.push(path.to_path_buf());
        }
        Ok(())
    }

    async fn send_audio(&self, _chat: ChatId, path: &Path) -> Result<(), DeliveryError> {
        if let Ok(mut audios) = self.audios.lock() {
            audios.push(path.to_path_buf());
        }
        Ok(())
    }

    async fn send_animation(&self, _chat: ChatId, _path: &Path) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_photo_group(
        &self,
        _chat: ChatId,
        remote_refs: &[String],
    ) -> Result<(), DeliveryError> {
        if let Ok(mut groups) = self.group_sends.lock() {
            groups.push(remote_refs.len());
        }
        Ok(())
    }

    async fn delete_message(&self, _chat: ChatId, message: MessageId) -> Result<(), DeliveryError> {
        if let Ok(mut deletes) = self.deletes.lock() {
            deletes.push(message.0);
        }
        Ok(())
    }

    async fn fetch_remote_file(&self, _file_id: &str) -> Result<Vec<u8>, DeliveryError> {
        Ok(Vec::new())
    }
}

/// Returns a pre-baked acquisition result and records invocations.
struct StubAcquirer {
    result: Acquired,
    calls: Mutex<Vec<(ContentKind, String)>>,
}

impl StubAcquirer {
    fn new(result: Acquired) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Acquirer for StubAcquirer {
    async fn acquire(
        &self,
        kind: ContentKind,
        link: &str,
    ) -> Result<Acquired, AcquisitionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((kind, link.to_string()));
        }
        Ok(self.result.clone())
    }
}

fn make_files(dir: &Path, count: usize) -> std::io::Result<Vec<PathBuf>> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("{i:02}.jpg"));
            std::fs::write(&path, b"jpeg")?;
            Ok(path)
        })
        .collect()
}

fn deps_with(acquirer: Arc<dyn Acquirer>) -> Result<PipelineDeps, reqwest::Error> {
    Ok(PipelineDeps {
        resolver: LinkResolver::new("test-agent")?,
        acquirer,
    })
}

#[tokio::test]
async fn album_of_one_stays_individual() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let paths = make_files(tmp.path(), 1)?;
    let gateway = RecordingGateway::default();

    let album = Acquired::PhotoAlbum {
        local_paths: paths,
        audio_path: None,
    };
    pipeline::deliver(&gateway, CHAT, &album).await?;

    assert_eq!(gateway.upload_count(), 1);
    assert!(gateway.group_sizes().is_empty());
    assert_eq!(gateway.delete_count(), 0);
    Ok(())
}

#[tokio::test]
async fn album_within_capacity_sends_one_group() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let paths = make_files(tmp.path(), 5)?;
    let gateway = RecordingGateway::default();

    let album = Acquired::PhotoAlbum {
        local_paths: paths,
        audio_path: None,
    };
    pipeline::deliver(&gateway, CHAT, &album).await?;

    assert_eq!(gateway.upload_count(), 5);
    assert_eq!(gateway.group_sizes(), vec![5]);
    // Every placeholder upload is deleted after the album goes out
    assert_eq!(gateway.delete_count(), 5);
    Ok(())
}

#[tokio::test]
async fn album_of_23_flushes_in_10_10_3() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let paths = make_files(tmp.path(), 23)?;
    let gateway = RecordingGateway::default();

    let album = Acquired::PhotoAlbum {
        local_paths: paths,
        audio_path: None,
    };
    pipeline::deliver(&gateway, CHAT, &album).await?;

    assert_eq!(gateway.upload_count(), 23);
    assert_eq!(gateway.group_sizes(), vec![10, 10, 3]);
    assert_eq!(gateway.delete_count(), 23);
    Ok(())
}

#[tokio::test]
async fn album_audio_is_sent_standalone() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let paths = make_files(tmp.path(), 2)?;
    let audio = tmp.path().join("soundtrack.mp3");
    std::fs::write(&audio, b"mp3")?;
    let gateway = RecordingGateway::default();

    let album = Acquired::PhotoAlbum {
        local_paths: paths,
        audio_path: Some(audio.clone()),
    };
    pipeline::deliver(&gateway, CHAT, &album).await?;

    assert_eq!(gateway.group_sizes(), vec![2]);
    let audios = gateway.audios.lock().map(|a| a.clone()).unwrap_or_default();
    assert_eq!(audios, vec![audio]);
    Ok(())
}

#[tokio::test]
async fn cleanup_runs_even_when_delivery_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let video = tmp.path().join("123456.mp4");
    std::fs::write(&video, b"mp4")?;

    let gateway = RecordingGateway::failing_video();
    let acquirer = Arc::new(StubAcquirer::new(Acquired::Video {
        local_path: video.clone(),
    }));
    let deps = deps_with(acquirer.clone())?;

    pipeline::process_text(
        &gateway,
        &deps,
        CHAT,
        "check this https://www.tiktok.com/@user/video/123456",
    )
    .await;

    assert_eq!(acquirer.call_count(), 1);
    assert_eq!(gateway.video_count(), 0);
    // The scratch file is released exactly once regardless of the failure
    assert!(!video.exists());
    Ok(())
}

#[tokio::test]
async fn video_scenario_sends_once_and_releases() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let video = tmp.path().join("123456.mp4");
    std::fs::write(&video, b"mp4")?;

    let gateway = RecordingGateway::default();
    let acquirer = Arc::new(StubAcquirer::new(Acquired::Video {
        local_path: video.clone(),
    }));
    let deps = deps_with(acquirer.clone())?;

    pipeline::process_text(
        &gateway,
        &deps,
        CHAT,
        "check this https://www.tiktok.com/@user/video/123456",
    )
    .await;

    let calls = acquirer.calls.lock().map(|c| c.clone()).unwrap_or_default();
    assert_eq!(
        calls,
        vec![(
            ContentKind::ShortVideo,
            "https://www.tiktok.com/@user/video/123456".to_string()
        )]
    );
    assert_eq!(gateway.video_count(), 1);
    assert!(!video.exists());
    Ok(())
}

#[tokio::test]
async fn plain_text_is_ignored_silently() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = RecordingGateway::default();
    let acquirer = Arc::new(StubAcquirer::new(Acquired::Video {
        local_path: PathBuf::from("unused.mp4"),
    }));
    let deps = deps_with(acquirer.clone())?;

    pipeline::process_text(&gateway, &deps, CHAT, "no links in here").await;

    assert_eq!(acquirer.call_count(), 0);
    assert_eq!(gateway.video_count(), 0);
    let texts = gateway.texts.lock().map(|t| t.clone()).unwrap_or_default();
    assert!(texts.is_empty());
    Ok(())
}

#[tokio::test]
async fn unresolvable_short_link_skips_acquisition() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = RecordingGateway::default();
    let acquirer = Arc::new(StubAcquirer::new(Acquired::Video {
        local_path: PathBuf::from("unused.mp4"),
    }));
    let deps = deps_with(acquirer.clone())?;

    // A fabricated token either fails to resolve (offline) or resolves to
    // an error page outside every backend's shape (online); in both cases
    // no acquisition may be attempted.
    pipeline::process_text(
        &gateway,
        &deps,
        CHAT,
        "look https://vm.tiktok.com/Zzzzzzzzzz",
    )
    .await;

    assert_eq!(acquirer.call_count(), 0);
    assert_eq!(gateway.video_count(), 0);
    Ok(())
}
