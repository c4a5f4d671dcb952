use std::time::Instant;

use log::{debug, error, trace, warn};

use crate::core::config::PlaybackConfig;
use crate::core::demuxer::{DecodeStatus, TimedFrame};
use crate::error::DecodeError;

/// Something that yields decoded frames in presentation order.
pub trait FrameSource {
    type Frame;

    fn next_frame(&mut self) -> Result<DecodeStatus<Self::Frame>, DecodeError>;
}

/// Monotonic time source used to advance the playback clock when the host's
/// delta is zero or noisy.
pub trait WallClock {
    /// Seconds elapsed since the previous call (or since `reset`).
    fn elapsed(&mut self) -> f64;

    /// Restarts measurement from now.
    fn reset(&mut self);
}

/// [`WallClock`] backed by [`Instant`].
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<Instant>,
}

impl WallClock for MonotonicClock {
    fn elapsed(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = self.last.map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        self.last = Some(now);
        elapsed
    }

    fn reset(&mut self) {
        self.last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not opened yet, or closed.
    Idle,
    Playing,
    /// Terminal: the stream ended or failed.
    Finished,
}

/// Result of one pacing tick, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// A new frame was published this tick.
    FrameReady,
    /// The next frame is not due yet.
    Waiting,
    /// The per-tick decode cap was hit while catching up.
    Stalled,
    Finished,
}

/// What the engine decided this tick.
#[derive(Debug)]
pub enum Tick<F> {
    /// This frame is due and must be published now.
    Publish(TimedFrame<F>),
    Waiting,
    Stalled,
    Finished,
}

impl<F> Tick<F> {
    pub fn status(&self) -> UpdateStatus {
        match self {
            Tick::Publish(_) => UpdateStatus::FrameReady,
            Tick::Waiting => UpdateStatus::Waiting,
            Tick::Stalled => UpdateStatus::Stalled,
            Tick::Finished => UpdateStatus::Finished,
        }
    }
}

/// Clock and frame pacing state machine.
///
/// Each tick advances the playback clock, then either releases the held
/// frame, holds a newly decoded early frame, drops late frames, or reports
/// end of stream. Frames more than two frame durations behind the clock are
/// dropped; a frame is never released before its timestamp.
pub struct PacingEngine<F> {
    state: PlaybackState,
    clock_time: f64,
    frame_duration: f64,
    pending: Option<TimedFrame<F>>,
    clock_smoothing: f64,
    max_frames_per_tick: usize,
    wall_clock: Box<dyn WallClock>,
    dropped_frames: u64,
}

impl<F> PacingEngine<F> {
    pub fn new(frame_duration: f64, config: &PlaybackConfig) -> Self {
        Self {
            state: PlaybackState::Idle,
            clock_time: 0.0,
            frame_duration: if frame_duration > 0.0 {
                frame_duration
            } else {
                config.fallback_frame_duration
            },
            pending: None,
            clock_smoothing: config.clock_smoothing,
            max_frames_per_tick: config.max_frames_per_tick,
            wall_clock: Box::new(MonotonicClock::default()),
            dropped_frames: 0,
        }
    }

    /// Replaces the wall clock, e.g. with the host's own timer.
    pub fn set_wall_clock(&mut self, mut clock: Box<dyn WallClock>) {
        clock.reset();
        self.wall_clock = clock;
    }

    /// Enters `Playing` with the clock at zero.
    pub fn start(&mut self) {
        self.state = PlaybackState::Playing;
        self.clock_time = 0.0;
        self.pending = None;
        self.dropped_frames = 0;
        self.wall_clock.reset();
    }

    /// Enters the terminal state and discards any held frame.
    pub fn finish(&mut self) {
        self.state = PlaybackState::Finished;
        self.pending = None;
    }

    /// Returns to `Idle`, as after close.
    pub fn reset(&mut self) {
        self.state = PlaybackState::Idle;
        self.clock_time = 0.0;
        self.pending = None;
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == PlaybackState::Finished
    }

    pub fn clock_time(&self) -> f64 {
        self.clock_time
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Timestamp of the held frame. Only `Some` while a frame is held.
    pub fn next_frame_pts(&self) -> Option<f64> {
        self.pending.as_ref().and_then(|p| p.pts)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Blends the wall-clock delta with the host delta. A host delta of zero
    /// or less is replaced by the wall-clock delta.
    pub fn tick_delta(&mut self, dt: f64) -> f64 {
        let wall_dt = self.wall_clock.elapsed();
        let host_dt = if dt > 0.0 { dt } else { wall_dt };
        self.clock_smoothing * wall_dt + (1.0 - self.clock_smoothing) * host_dt
    }

    /// Runs one pacing tick.
    ///
    /// `audio_clock` is the playing audio track's position. When present it
    /// replaces the blended advance, so video is slaved to audio. The clock
    /// never moves backwards.
    ///
    /// A decode error ends playback and is returned to the caller.
    pub fn update<S>(
        &mut self,
        dt: f64,
        audio_clock: Option<f64>,
        source: &mut S,
    ) -> Result<Tick<F>, DecodeError>
    where
        S: FrameSource<Frame = F>,
    {
        match self.state {
            PlaybackState::Finished => return Ok(Tick::Finished),
            PlaybackState::Idle => return Ok(Tick::Waiting),
            PlaybackState::Playing => {}
        }

        let delta = self.tick_delta(dt);
        match audio_clock {
            Some(audio_time) => self.clock_time = self.clock_time.max(audio_time),
            None => self.clock_time += delta.max(0.0),
        }

        if let Some(pending) = self.pending.take() {
            // Held frames always carry a timestamp.
            if pending.pts.unwrap_or(f64::MAX) <= self.clock_time {
                return Ok(Tick::Publish(pending));
            }
            self.pending = Some(pending);
            return Ok(Tick::Waiting);
        }

        for _ in 0..self.max_frames_per_tick {
            let status = match source.next_frame() {
                Ok(status) => status,
                Err(e) => {
                    error!("Decode failed at {:.3}s, stopping playback: {e}", self.clock_time);
                    self.finish();
                    return Err(e);
                }
            };

            let mut frame = match status {
                DecodeStatus::Frame(frame) => frame,
                DecodeStatus::Pending => continue,
                DecodeStatus::Eof => {
                    debug!(
                        "End of stream at {:.3}s ({} frames dropped)",
                        self.clock_time, self.dropped_frames
                    );
                    self.finish();
                    return Ok(Tick::Finished);
                }
            };

            let pts = *frame.pts.get_or_insert(self.clock_time);
            if pts + 2.0 * self.frame_duration < self.clock_time {
                trace!("Dropping late frame {pts:.3}s at {:.3}s", self.clock_time);
                self.dropped_frames += 1;
                continue;
            }
            if pts > self.clock_time {
                self.pending = Some(frame);
                return Ok(Tick::Waiting);
            }
            return Ok(Tick::Publish(frame));
        }

        warn!(
            "Playback stalled: {} decode attempts at {:.3}s without a presentable frame",
            self.max_frames_per_tick, self.clock_time
        );
        Ok(Tick::Stalled)
    }
}
