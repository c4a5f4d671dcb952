//! Status-code surface for engine hosts.
//!
//! Wraps a [`VideoSession`] and reports plain integers: `open` returns `0`
//! or `-1`, `update` returns `1` while playing, `0` once finished and `-1` on
//! error, `draw` returns `0` when something was drawn and `-1` otherwise.
//! Errors are logged, never returned.

use log::{error, warn};

use crate::core::audio::AudioSink;
use crate::core::byte_source::ByteSource;
use crate::core::config::PlaybackConfig;
use crate::core::media::{FfmpegMedia, MediaSource};
use crate::core::pacing::UpdateStatus;
use crate::core::render::RenderSink;
use crate::core::session::{EngineContext, VideoSession};
use crate::core::storage::StorageKind;

pub struct VideoPlayer<R: RenderSink, A: AudioSink, M: MediaSource = FfmpegMedia> {
    session: Option<VideoSession<M, R, A>>,
    config: PlaybackConfig,
}

impl<R: RenderSink, A: AudioSink> VideoPlayer<R, A, FfmpegMedia> {
    /// Opens `path` from the given storage. Any previous video is closed first.
    pub fn open(&mut self, ctx: &mut EngineContext<R, A>, path: &str, kind: StorageKind) -> i32 {
        self.close(ctx);
        match VideoSession::open(ctx, path, kind, self.config.clone()) {
            Ok(session) => {
                self.session = Some(session);
                0
            }
            Err(e) => {
                error!("Failed to open video {path}: {e}");
                -1
            }
        }
    }

    /// Opens an in-memory buffer. The bytes are copied.
    pub fn open_memory(&mut self, ctx: &mut EngineContext<R, A>, data: &[u8]) -> i32 {
        self.close(ctx);
        let result = ByteSource::copy_from_slice(data)
            .map_err(Into::into)
            .and_then(|source| VideoSession::open_source(ctx, &source, self.config.clone()));
        match result {
            Ok(session) => {
                self.session = Some(session);
                0
            }
            Err(e) => {
                error!("Failed to open video from memory: {e}");
                -1
            }
        }
    }
}

impl<R: RenderSink, A: AudioSink, M: MediaSource> VideoPlayer<R, A, M> {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            session: None,
            config,
        }
    }

    /// Opens an already constructed media source.
    pub fn open_media(&mut self, ctx: &mut EngineContext<R, A>, media: M) -> i32 {
        self.close(ctx);
        match VideoSession::from_media(ctx, media, self.config.clone()) {
            Ok(session) => {
                self.session = Some(session);
                0
            }
            Err(e) => {
                error!("Failed to open video: {e}");
                -1
            }
        }
    }

    pub fn session(&self) -> Option<&VideoSession<M, R, A>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut VideoSession<M, R, A>> {
        self.session.as_mut()
    }

    /// `1` frame ready or still playing, `0` finished, `-1` error or not open.
    pub fn update(&mut self, ctx: &mut EngineContext<R, A>, dt: f64) -> i32 {
        let Some(session) = self.session.as_mut() else {
            return -1;
        };
        match session.update(ctx, dt) {
            Ok(UpdateStatus::FrameReady | UpdateStatus::Waiting | UpdateStatus::Stalled) => 1,
            Ok(UpdateStatus::Finished) => 0,
            Err(e) => {
                error!("Video update failed: {e}");
                -1
            }
        }
    }

    /// `0` when a frame was drawn, `-1` when there is nothing to draw.
    pub fn draw(&mut self, ctx: &mut EngineContext<R, A>) -> i32 {
        let Some(session) = self.session.as_ref() else {
            return -1;
        };
        match session.draw(ctx) {
            Ok(true) => 0,
            Ok(false) => -1,
            Err(e) => {
                warn!("Video draw failed: {e}");
                -1
            }
        }
    }

    pub fn close(&mut self, ctx: &mut EngineContext<R, A>) {
        if let Some(mut session) = self.session.take() {
            session.close(ctx);
        }
    }

    /// Container duration in seconds, or `-1.0` when unknown or not open.
    pub fn total_seconds(&self) -> f64 {
        self.session
            .as_ref()
            .and_then(|s| s.total_seconds())
            .unwrap_or(-1.0)
    }

    /// Playback clock in seconds, `0.0` when not open.
    pub fn current_seconds(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.current_seconds())
    }
}
