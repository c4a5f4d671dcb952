use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::core::audio::{AudioSink, AudioTrackBridge};
use crate::core::byte_source::ByteSource;
use crate::core::config::{PlaybackConfig, TEX_RING_SIZE};
use crate::core::converter::PlanarYuvFrame;
use crate::core::demuxer::{TimedFrame, VideoInfo};
use crate::core::media::{FfmpegMedia, MediaSource};
use crate::core::pacing::{PacingEngine, PlaybackState, Tick, UpdateStatus, WallClock};
use crate::core::render::{letterbox, RenderSink};
use crate::core::ring::TextureRing;
use crate::core::storage::{ByteProvider, StorageKind};
use crate::core::stream_info::StreamInfo;
use crate::error::{AudioError, Error, OpenError, Result};

/// Host services shared by every session: renderer, optional mixer and byte
/// provider. Passed by `&mut` into each session entry point.
pub struct EngineContext<R, A> {
    pub renderer: R,
    pub mixer: Option<A>,
    pub provider: Arc<dyn ByteProvider>,
}

impl<R: RenderSink, A: AudioSink> EngineContext<R, A> {
    pub fn new(renderer: R, mixer: Option<A>, provider: Arc<dyn ByteProvider>) -> Self {
        Self {
            renderer,
            mixer,
            provider,
        }
    }
}

/// One open video: media source, display ring, pacing state and audio track.
///
/// Resources are acquired in the order media, textures, audio track and
/// released in reverse by [`VideoSession::close`]. Textures belong to the
/// host renderer, so a session must be closed with the context it was
/// opened with.
pub struct VideoSession<M: MediaSource, R: RenderSink, A: AudioSink> {
    media: Option<M>,
    ring: Option<TextureRing<R::Texture>>,
    audio: Option<AudioTrackBridge<A::Track>>,
    pacing: PacingEngine<M::Frame>,
    staging: PlanarYuvFrame,
    info: VideoInfo,
    duration: Option<f64>,
    config: PlaybackConfig,
}

impl<R: RenderSink, A: AudioSink> VideoSession<FfmpegMedia, R, A> {
    /// Loads `path` through the context's byte provider and opens it.
    pub fn open(
        ctx: &mut EngineContext<R, A>,
        path: &str,
        kind: StorageKind,
        config: PlaybackConfig,
    ) -> Result<Self> {
        let data = ctx.provider.read_all(path, kind).map_err(|e| {
            error!("Failed to read video {path}: {e}");
            e
        })?;
        let source = ByteSource::from_bytes(data)?;
        info!("Opening video {path} ({} bytes)", source.len());
        Self::open_source(ctx, &source, config)
    }

    /// Opens an already loaded buffer.
    pub fn open_source(
        ctx: &mut EngineContext<R, A>,
        source: &ByteSource,
        config: PlaybackConfig,
    ) -> Result<Self> {
        let media = FfmpegMedia::open(source, &config)?;
        Self::from_media(ctx, media, config)
    }
}

impl<M: MediaSource, R: RenderSink, A: AudioSink> VideoSession<M, R, A> {
    /// Builds a playing session around an opened media source.
    ///
    /// On failure every texture created so far is destroyed and `media` is
    /// dropped before the error is returned.
    pub fn from_media(ctx: &mut EngineContext<R, A>, mut media: M, config: PlaybackConfig) -> Result<Self> {
        let info = media.video_info().clone();
        let duration = media.duration_seconds();

        let ring = create_ring(&mut ctx.renderer, info.width, info.height)?;

        let audio = if config.audio_enabled {
            media.take_audio().and_then(|asset| match ctx.mixer.as_mut() {
                Some(mixer) => {
                    let mut bridge = AudioTrackBridge::new(asset);
                    match bridge.start(mixer, 0.0, config.audio_resync_threshold) {
                        Ok(()) => Some(bridge),
                        Err(e) => {
                            warn!("Audio track unavailable, playing silent: {e}");
                            bridge.release(mixer);
                            None
                        }
                    }
                }
                None => {
                    warn!("{}, playing silent", AudioError::NoMixer);
                    None
                }
            })
        } else {
            None
        };

        let mut pacing = PacingEngine::new(info.frame_duration, &config);
        pacing.start();

        info!(
            "Video session playing: {}x{}, {:.3}s/frame, duration {}, audio {}",
            info.width,
            info.height,
            pacing.frame_duration(),
            duration.map_or("unknown".to_string(), |d| format!("{d:.2}s")),
            if audio.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            media: Some(media),
            ring: Some(ring),
            audio,
            pacing,
            staging: PlanarYuvFrame::new(info.width, info.height),
            info,
            duration,
            config,
        })
    }

    /// Replaces the wall clock used to smooth the host's delta.
    pub fn set_wall_clock(&mut self, clock: Box<dyn WallClock>) {
        self.pacing.set_wall_clock(clock);
    }

    pub fn state(&self) -> PlaybackState {
        self.pacing.state()
    }

    pub fn is_finished(&self) -> bool {
        self.pacing.is_finished()
    }

    pub fn is_open(&self) -> bool {
        self.media.is_some()
    }

    pub fn video_info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn streams(&self) -> &[StreamInfo] {
        match self.media.as_ref() {
            Some(media) => media.streams(),
            None => &[],
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Container duration in seconds, if known.
    pub fn total_seconds(&self) -> Option<f64> {
        self.duration
    }

    /// Playback clock in seconds.
    pub fn current_seconds(&self) -> f64 {
        self.pacing.clock_time()
    }

    /// Advances playback by one host tick.
    ///
    /// Decode and conversion errors end playback; the error is returned once
    /// and later calls report [`UpdateStatus::Finished`].
    pub fn update(&mut self, ctx: &mut EngineContext<R, A>, dt: f64) -> Result<UpdateStatus> {
        let Some(media) = self.media.as_mut() else {
            return Err(Error::NotOpen);
        };

        if self.pacing.is_finished() {
            let delta = self.pacing.tick_delta(dt);
            if let (Some(audio), Some(mixer)) = (self.audio.as_mut(), ctx.mixer.as_mut()) {
                audio.tick_fade(mixer, delta);
            }
            return Ok(UpdateStatus::Finished);
        }

        let audio_clock = match (self.audio.as_ref(), ctx.mixer.as_ref()) {
            (Some(audio), Some(mixer)) => audio.position(mixer),
            _ => None,
        };

        let tick = match self.pacing.update(dt, audio_clock, media) {
            Ok(tick) => tick,
            Err(e) => {
                self.begin_fade_out(ctx);
                return Err(e.into());
            }
        };

        match tick {
            Tick::Publish(frame) => {
                self.publish(ctx, frame)?;
                Ok(UpdateStatus::FrameReady)
            }
            Tick::Finished => {
                self.begin_fade_out(ctx);
                Ok(UpdateStatus::Finished)
            }
            other => Ok(other.status()),
        }
    }

    fn publish(&mut self, ctx: &mut EngineContext<R, A>, frame: TimedFrame<M::Frame>) -> Result<()> {
        let (Some(media), Some(ring)) = (self.media.as_mut(), self.ring.as_mut()) else {
            return Err(Error::NotOpen);
        };

        if let Err(e) = media.convert(&frame.frame, &mut self.staging) {
            error!("Frame conversion failed, stopping playback: {e}");
            self.pacing.finish();
            self.begin_fade_out(ctx);
            return Err(e.into());
        }

        let slot = ring.acquire_write_slot();
        ctx.renderer.upload_yuv(ring.slot_mut(&slot), &self.staging)?;
        ring.publish(slot);
        Ok(())
    }

    fn begin_fade_out(&mut self, ctx: &mut EngineContext<R, A>) {
        if let (Some(audio), Some(mixer)) = (self.audio.as_mut(), ctx.mixer.as_mut()) {
            audio.begin_fade_out(mixer, self.config.fade_out_duration);
        }
    }

    /// Blits the visible frame letterboxed into the logical canvas.
    ///
    /// Returns `Ok(false)` when there is nothing to draw: no frame published
    /// yet, playback finished, or the session is closed.
    pub fn draw(&self, ctx: &mut EngineContext<R, A>) -> Result<bool> {
        if self.pacing.is_finished() {
            return Ok(false);
        }
        let Some(texture) = self.ring.as_ref().and_then(|ring| ring.published()) else {
            return Ok(false);
        };

        let (lw, lh) = match ctx.renderer.logical_size() {
            (w, h) if w > 0 && h > 0 => (w as u32, h as u32),
            _ => (self.info.width, self.info.height),
        };
        let dest = letterbox(self.info.width, self.info.height, lw, lh);
        ctx.renderer.blit(texture, dest)?;
        Ok(true)
    }

    /// Releases every resource in reverse order of acquisition. Safe to call
    /// more than once.
    pub fn close(&mut self, ctx: &mut EngineContext<R, A>) {
        if let Some(mut audio) = self.audio.take() {
            match ctx.mixer.as_mut() {
                Some(mixer) => audio.release(mixer),
                None => audio.abandon(),
            }
        }
        if let Some(ring) = self.ring.take() {
            for texture in ring.drain() {
                ctx.renderer.destroy_texture(texture);
            }
        }
        if self.media.take().is_some() {
            debug!("Video session closed at {:.3}s", self.pacing.clock_time());
        }
        self.pacing.reset();
    }
}

impl<M: MediaSource, R: RenderSink, A: AudioSink> Drop for VideoSession<M, R, A> {
    fn drop(&mut self) {
        if self.ring.is_some() || self.audio.is_some() {
            warn!("VideoSession dropped without close(); host textures and tracks were not released");
        }
    }
}

fn create_ring<R: RenderSink>(
    renderer: &mut R,
    width: u32,
    height: u32,
) -> std::result::Result<TextureRing<R::Texture>, OpenError> {
    let mut textures = Vec::with_capacity(TEX_RING_SIZE);
    for _ in 0..TEX_RING_SIZE {
        match renderer.create_texture(width, height) {
            Ok(texture) => textures.push(texture),
            Err(e) => {
                error!("Failed to create video texture {}x{}: {e}", width, height);
                for texture in textures {
                    renderer.destroy_texture(texture);
                }
                return Err(OpenError::Render(e));
            }
        }
    }
    TextureRing::new(textures).ok_or(OpenError::AllocationFailed("texture ring"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{
        CountingRenderer, ManualClock, MemoryProvider, MockMixer, ScriptedSource,
    };

    type Ctx = EngineContext<CountingRenderer, MockMixer>;
    type Session = VideoSession<ScriptedSource, CountingRenderer, MockMixer>;

    fn ctx(mixer: Option<MockMixer>) -> Ctx {
        let _ = env_logger::builder().is_test(true).try_init();
        EngineContext::new(
            CountingRenderer::with_logical_size(800, 600),
            mixer,
            Arc::new(MemoryProvider::default()),
        )
    }

    fn session(ctx: &mut Ctx, source: ScriptedSource, clock: &ManualClock) -> Session {
        let mut session = VideoSession::from_media(ctx, source, PlaybackConfig::default()).unwrap();
        session.set_wall_clock(Box::new(clock.clone()));
        session
    }

    #[test]
    fn test_open_creates_ring_and_starts_playing() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.0);
        let mut session = session(&mut ctx, ScriptedSource::frames(&[0.0]), &clock);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(ctx.renderer.created, TEX_RING_SIZE);
        assert!(!session.draw(&mut ctx).unwrap());
        session.close(&mut ctx);
    }

    #[test]
    fn test_texture_failure_rolls_back() {
        let mut ctx = ctx(None);
        ctx.renderer.fail_create_at = Some(2);
        let source = ScriptedSource::frames(&[0.0]);
        let calls = source.call_counter();
        let result = Session::from_media(&mut ctx, source, PlaybackConfig::default());
        assert!(matches!(result, Err(Error::Open(OpenError::Render(_)))));
        assert_eq!(ctx.renderer.live_textures(), 0);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_update_publishes_and_draw_letterboxes() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.0);
        let source = ScriptedSource::frames(&[0.0, 0.1]);
        let mut session = session(&mut ctx, source, &clock);

        assert_eq!(session.update(&mut ctx, 0.0).unwrap(), UpdateStatus::FrameReady);
        assert!(session.draw(&mut ctx).unwrap());
        let (drawn_id, rect) = ctx.renderer.blits[0];
        assert_eq!(ctx.renderer.uploads, vec![drawn_id]);
        // 64x36 is 16:9; the canvas is 4:3.
        assert_eq!((rect.x, rect.y, rect.w, rect.h), (0.0, 75.0, 800.0, 450.0));
        session.close(&mut ctx);
    }

    #[test]
    fn test_draw_falls_back_to_video_size() {
        let mut ctx = ctx(None);
        ctx.renderer.logical = (0, 0);
        let clock = ManualClock::new(0.0);
        let mut session = session(&mut ctx, ScriptedSource::frames(&[0.0]), &clock);
        session.update(&mut ctx, 0.0).unwrap();
        assert!(session.draw(&mut ctx).unwrap());
        let (_, rect) = ctx.renderer.blits[0];
        assert_eq!((rect.w, rect.h), (64.0, 36.0));
        session.close(&mut ctx);
    }

    #[test]
    fn test_consecutive_frames_use_distinct_slots() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.1);
        let pts: Vec<f64> = (0..6).map(|i| i as f64 * 0.1).collect();
        let mut session = session(&mut ctx, ScriptedSource::frames(&pts), &clock);

        let mut drawn = Vec::new();
        for _ in 0..6 {
            if session.update(&mut ctx, 0.1).unwrap() == UpdateStatus::FrameReady {
                session.draw(&mut ctx).unwrap();
                drawn.push(ctx.renderer.blits.last().map(|(id, _)| *id));
            }
        }
        assert!(drawn.len() >= 2);
        assert!(drawn.windows(2).all(|w| w[0] != w[1]));
        session.close(&mut ctx);
    }

    #[test]
    fn test_finished_is_terminal() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.1);
        let source = ScriptedSource::frames(&[0.0]);
        let calls = source.call_counter();
        let mut session = session(&mut ctx, source, &clock);

        assert_eq!(session.update(&mut ctx, 0.1).unwrap(), UpdateStatus::FrameReady);
        assert_eq!(session.update(&mut ctx, 0.1).unwrap(), UpdateStatus::Finished);
        let after_finish = calls.get();
        for _ in 0..3 {
            assert_eq!(session.update(&mut ctx, 0.1).unwrap(), UpdateStatus::Finished);
        }
        assert_eq!(calls.get(), after_finish);
        assert!(!session.draw(&mut ctx).unwrap());
        session.close(&mut ctx);
    }

    #[test]
    fn test_conversion_error_is_fatal() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.1);
        let source = ScriptedSource::frames(&[0.0, 0.1]).failing_conversion();
        let mut session = session(&mut ctx, source, &clock);

        assert!(matches!(session.update(&mut ctx, 0.1), Err(Error::Conversion(_))));
        assert!(session.is_finished());
        assert_eq!(session.update(&mut ctx, 0.1).unwrap(), UpdateStatus::Finished);
        session.close(&mut ctx);
    }

    #[test]
    fn test_decode_error_is_fatal() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.1);
        let source = ScriptedSource::new(vec![crate::core::test_support::Scripted::Error]);
        let mut session = session(&mut ctx, source, &clock);
        assert!(matches!(session.update(&mut ctx, 0.1), Err(Error::Decode(_))));
        assert_eq!(session.state(), PlaybackState::Finished);
        session.close(&mut ctx);
    }

    #[test]
    fn test_clock_tracks_audio_position() {
        let mut ctx = ctx(Some(MockMixer::default()));
        let clock = ManualClock::new(0.5);
        let pts: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let source = ScriptedSource::frames(&pts).with_audio(5.0);
        let mut session = session(&mut ctx, source, &clock);
        assert!(session.has_audio());

        for position in [0.1, 0.25, 0.4, 0.9] {
            if let Some(mixer) = ctx.mixer.as_mut() {
                mixer.position = Some(position);
            }
            session.update(&mut ctx, 0.5).unwrap();
            assert!((session.current_seconds() - position).abs() < 1e-9);
        }
        session.close(&mut ctx);
    }

    #[test]
    fn test_short_soundtrack_hands_clock_back() {
        let mut ctx = ctx(Some(MockMixer::default()));
        let clock = ManualClock::new(0.1);
        let pts: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let source = ScriptedSource::frames(&pts).with_audio(1.0);
        let mut session = session(&mut ctx, source, &clock);
        assert!(session.has_audio());

        // The mixer parks the track at its end while 2 s of picture remain.
        if let Some(mixer) = ctx.mixer.as_mut() {
            mixer.position = Some(1.0);
        }
        let mut status = UpdateStatus::Waiting;
        for _ in 0..200 {
            status = session.update(&mut ctx, 0.1).unwrap();
            if status == UpdateStatus::Finished {
                break;
            }
        }
        assert_eq!(status, UpdateStatus::Finished);
        assert!(session.current_seconds() >= 2.9);
        session.close(&mut ctx);
    }

    #[test]
    fn test_without_mixer_plays_silent() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.1);
        let source = ScriptedSource::frames(&[0.0]).with_audio(1.0);
        let mut session = session(&mut ctx, source, &clock);
        assert!(!session.has_audio());
        assert_eq!(session.update(&mut ctx, 0.1).unwrap(), UpdateStatus::FrameReady);
        session.close(&mut ctx);
    }

    #[test]
    fn test_track_failure_plays_silent() {
        let mixer = MockMixer {
            fail_create: true,
            ..Default::default()
        };
        let mut ctx = ctx(Some(mixer));
        let clock = ManualClock::new(0.1);
        let source = ScriptedSource::frames(&[0.0]).with_audio(1.0);
        let mut session = session(&mut ctx, source, &clock);
        assert!(!session.has_audio());
        session.close(&mut ctx);
    }

    #[test]
    fn test_fade_out_after_end_of_stream() {
        let mut ctx = ctx(Some(MockMixer::default()));
        let clock = ManualClock::new(0.0);
        let source = ScriptedSource::frames(&[0.0]).with_audio(10.0);
        let config = PlaybackConfig::default().set_fade_out_duration(1.0);
        let mut session = VideoSession::from_media(&mut ctx, source, config).unwrap();
        session.set_wall_clock(Box::new(clock.clone()));

        if let Some(mixer) = ctx.mixer.as_mut() {
            mixer.position = Some(0.0);
        }
        assert_eq!(session.update(&mut ctx, 0.0).unwrap(), UpdateStatus::FrameReady);
        assert_eq!(session.update(&mut ctx, 0.0).unwrap(), UpdateStatus::Finished);

        clock.set(0.5);
        session.update(&mut ctx, 0.5).unwrap();
        let mixer = ctx.mixer.as_ref().unwrap();
        assert!((mixer.gains.last().copied().unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(mixer.stops, 0);

        session.update(&mut ctx, 0.5).unwrap();
        let mixer = ctx.mixer.as_ref().unwrap();
        assert_eq!(mixer.stops, 1);
        assert_eq!(mixer.gains.last().copied(), Some(0.0));
        session.close(&mut ctx);
    }

    #[test]
    fn test_close_releases_everything_once() {
        let mut ctx = ctx(Some(MockMixer::default()));
        let clock = ManualClock::new(0.1);
        let source = ScriptedSource::frames(&[0.0]).with_audio(1.0);
        let mut session = session(&mut ctx, source, &clock);
        session.update(&mut ctx, 0.1).unwrap();

        session.close(&mut ctx);
        session.close(&mut ctx);

        assert_eq!(ctx.renderer.live_textures(), 0);
        assert_eq!(ctx.renderer.destroyed, TEX_RING_SIZE);
        let mixer = ctx.mixer.as_ref().unwrap();
        assert_eq!(mixer.live_tracks(), 0);
        assert_eq!(mixer.destroyed, 1);
        assert!(!session.is_open());
        assert_eq!(session.state(), PlaybackState::Idle);
        assert!(matches!(session.update(&mut ctx, 0.1), Err(Error::NotOpen)));
        assert!(!session.draw(&mut ctx).unwrap());
    }

    #[test]
    fn test_total_and_current_seconds() {
        let mut ctx = ctx(None);
        let clock = ManualClock::new(0.25);
        let source = ScriptedSource::frames(&[0.0, 0.1, 0.2]).with_frame_duration(0.1);
        let mut session = session(&mut ctx, source, &clock);
        assert!((session.total_seconds().unwrap() - 0.3).abs() < 1e-9);
        session.update(&mut ctx, 0.25).unwrap();
        assert!((session.current_seconds() - 0.25).abs() < 1e-9);
        session.close(&mut ctx);
    }

    #[test]
    fn test_open_reports_missing_file() {
        let mut ctx = ctx(None);
        let result = VideoSession::<FfmpegMedia, _, _>::open(&mut ctx, "missing.mp4", StorageKind::Title, PlaybackConfig::default());
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(ctx.renderer.created, 0);
    }

    #[test]
    fn test_open_rejects_empty_file() {
        let mut ctx = EngineContext::<CountingRenderer, MockMixer>::new(
            CountingRenderer::default(),
            None,
            Arc::new(MemoryProvider::with_file("empty.mp4", b"")),
        );
        let result = VideoSession::<FfmpegMedia, _, _>::open(&mut ctx, "empty.mp4", StorageKind::Title, PlaybackConfig::default());
        assert!(matches!(result, Err(Error::Open(OpenError::EmptyBuffer))));
        assert_eq!(ctx.renderer.created, 0);
    }

    #[test]
    #[ignore] // Requires test.mp4 in the crate root
    fn test_play_test_file_to_end() {
        let data = std::fs::read("test.mp4").unwrap();
        let mut ctx = EngineContext::<CountingRenderer, MockMixer>::new(
            CountingRenderer::with_logical_size(1280, 720),
            Some(MockMixer::default()),
            Arc::new(MemoryProvider::default()),
        );
        let source = ByteSource::copy_from_slice(&data).unwrap();
        drop(data);
        let mut session = VideoSession::open_source(&mut ctx, &source, PlaybackConfig::default()).unwrap();
        session.set_wall_clock(Box::new(ManualClock::new(1.0 / 30.0)));

        let mut frames = 0;
        for _ in 0..100_000 {
            match session.update(&mut ctx, 1.0 / 30.0).unwrap() {
                UpdateStatus::FrameReady => frames += 1,
                UpdateStatus::Finished => break,
                _ => {}
            }
            session.draw(&mut ctx).unwrap();
        }
        assert!(frames > 0);
        assert!(session.is_finished());
        session.close(&mut ctx);
        assert_eq!(ctx.renderer.live_textures(), 0);
    }
}
