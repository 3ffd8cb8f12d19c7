//! Asynchronous fetch+decode of a single audio asset.
//!
//! An [`AudioAsset`] starts at most one load over its lifetime. The load runs on a
//! worker thread; its result is picked up on the control thread by [`AudioAsset::poll`]
//! (or [`AudioAsset::wait`]) and settles the asset exactly once, either to
//! [`AssetStatus::Ready`] or to [`AssetStatus::Failed`]. A failed asset never goes back
//! to the network.

use crate::audio_data::{AssetDecoder, AssetFetcher, PcmBuffer, SymphoniaDecoder};
use crate::error::{Result, StemflowError};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, bounded};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    /// No load has been started (or the buffer was unloaded).
    Unloaded,
    /// A fetch+decode is in flight.
    Loading,
    /// The decoded buffer is available.
    Ready,
    /// Fetch or decode failed. Terminal.
    Failed,
}

/// Shared fetch+decode pipeline handed to every asset.
#[derive(Clone)]
pub struct AssetLoader {
    fetcher: Arc<dyn AssetFetcher>,
    decoder: Arc<dyn AssetDecoder>,
    sample_rate: u32,
}

impl AssetLoader {
    /// `sample_rate` is the engine rate decoded buffers are resampled to.
    pub fn new(fetcher: Arc<dyn AssetFetcher>, sample_rate: u32) -> Self {
        Self {
            fetcher,
            decoder: Arc::new(SymphoniaDecoder),
            sample_rate,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn AssetDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Runs fetch, decode and resample on the calling thread.
    pub fn load_blocking(&self, url: &str) -> Result<PcmBuffer> {
        let bytes = self.fetcher.fetch(url)?;
        let buffer = self.decoder.decode(url, bytes)?;
        buffer.resample(self.sample_rate)
    }

    fn spawn(&self, url: &str) -> Receiver<Result<PcmBuffer>> {
        let (sender, receiver) = bounded(1);
        let loader = self.clone();
        let owned_url = url.to_string();

        let spawned = std::thread::Builder::new()
            .name("stemflow-asset-load".to_string())
            .spawn(move || {
                let result = loader.load_blocking(&owned_url);
                let _ = sender.send(result);
            });

        // On spawn failure the sender is dropped with the closure, which the asset
        // observes as a disconnected channel and settles as a failure.
        if let Err(e) = spawned {
            log::error!("Failed to spawn loader thread for {}: {}", url, e);
        }

        receiver
    }
}

pub struct AudioAsset {
    url: String,
    loader: AssetLoader,
    buffer: Option<Arc<PcmBuffer>>,
    pending: Option<Receiver<Result<PcmBuffer>>>,
    failed: bool,
}

impl AudioAsset {
    pub fn new(url: impl Into<String>, loader: AssetLoader) -> Self {
        Self {
            url: url.into(),
            loader,
            buffer: None,
            pending: None,
            failed: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> AssetStatus {
        if self.buffer.is_some() {
            AssetStatus::Ready
        } else if self.pending.is_some() {
            AssetStatus::Loading
        } else if self.failed {
            AssetStatus::Failed
        } else {
            AssetStatus::Unloaded
        }
    }

    pub fn buffer(&self) -> Option<&Arc<PcmBuffer>> {
        self.buffer.as_ref()
    }

    /// Starts loading if nothing is loaded or in flight. Calling it again while a load
    /// is outstanding joins that load instead of issuing a second request.
    pub fn load(&mut self) -> AssetStatus {
        if self.status() == AssetStatus::Unloaded {
            log::debug!("Loading asset {}", self.url);
            self.pending = Some(self.loader.spawn(&self.url));
        }
        self.status()
    }

    /// Checks for a finished load without blocking. Returns the settled status the
    /// one time a pending load completes, `None` otherwise.
    pub fn poll(&mut self) -> Option<AssetStatus> {
        let outcome = match self.pending.as_ref()?.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(Self::worker_lost()),
        };
        Some(self.settle(outcome))
    }

    /// Blocks for at most `timeout` waiting for a pending load.
    pub fn wait(&mut self, timeout: Duration) -> Option<AssetStatus> {
        let outcome = match self.pending.as_ref()?.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => Err(Self::worker_lost()),
        };
        Some(self.settle(outcome))
    }

    /// Drops the decoded buffer. A later [`load`](Self::load) fetches it again.
    pub fn unload(&mut self) {
        self.buffer = None;
    }

    fn settle(&mut self, outcome: Result<PcmBuffer>) -> AssetStatus {
        self.pending = None;
        match outcome {
            Ok(buffer) => {
                log::debug!(
                    "Asset {} ready ({:.2}s)",
                    self.url,
                    buffer.duration_secs()
                );
                self.buffer = Some(Arc::new(buffer));
            }
            Err(e) => {
                log::error!("Error loading sound {}: {}", self.url, e);
                self.failed = true;
            }
        }
        self.status()
    }

    fn worker_lost() -> StemflowError {
        StemflowError::AudioLoading("loader thread exited without a result".to_string())
    }
}
