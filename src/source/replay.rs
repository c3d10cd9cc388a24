use super::LatestFrameSlot;
use crate::error::{CounterError, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "pgm"];

/// Replays still images from a directory into a [`LatestFrameSlot`], standing in for a
/// camera driver on kiosks without one and in bench setups.
pub struct ReplayFeed {
    dir: PathBuf,
    frame_interval: Duration,
    slot: Arc<LatestFrameSlot>,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReplayFeed {
    pub fn new<P: AsRef<Path>>(dir: P, frame_interval: Duration, slot: Arc<LatestFrameSlot>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            frame_interval,
            slot,
            cancellation_token: CancellationToken::new(),
            task: None,
        }
    }

    /// Load the images and start pushing them in a loop
    pub async fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            warn!("Replay feed is already running");
            return Ok(());
        }

        let dir = self.dir.clone();
        let images = tokio::task::spawn_blocking(move || load_images(&dir))
            .await
            .map_err(|e| CounterError::component("replay_feed", format!("Loader panicked: {}", e)))??;

        if images.is_empty() {
            return Err(CounterError::component(
                "replay_feed",
                format!("No images found in {}", self.dir.display()),
            ));
        }

        info!(
            "Replaying {} image(s) from {} every {:?}",
            images.len(),
            self.dir.display(),
            self.frame_interval
        );

        let slot = Arc::clone(&self.slot);
        let token = self.cancellation_token.clone();
        let frame_interval = self.frame_interval;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            for image in images.iter().cycle() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let id = slot.push_gray(image.clone());
                        debug!("Replayed frame {}", id);
                    }
                }
            }

            debug!("Replay feed task ended");
        }));

        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.cancellation_token.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| CounterError::component("replay_feed", e.to_string()))?;
        }
        info!("Replay feed stopped");
        Ok(())
    }
}

fn load_images(dir: &Path) -> Result<Vec<GrayImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        match image::open(&path) {
            Ok(img) => images.push(img.to_luma8()),
            Err(e) => warn!("Skipping unreadable image {}: {}", path.display(), e),
        }
    }

    Ok(images)
}
