/// Number of display buffers rotated by the texture ring.
pub const TEX_RING_SIZE: usize = 3;

/// Output format of the audio path: interleaved signed 16-bit stereo.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
pub const AUDIO_CHANNELS: u16 = 2;
pub const AUDIO_BYTES_PER_FRAME: usize = 2 * AUDIO_CHANNELS as usize;

/// Tunables of a playback session.
///
/// Built with consuming `set_*` calls:
///
/// ```rust,ignore
/// let config = PlaybackConfig::default()
///     .set_max_frames_per_tick(32)
///     .set_audio_enabled(false);
/// ```
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub(crate) clock_smoothing: f64,
    pub(crate) fallback_frame_duration: f64,
    pub(crate) max_frames_per_tick: usize,
    pub(crate) audio_enabled: bool,
    pub(crate) audio_resync_threshold: f64,
    pub(crate) fade_out_duration: f64,
    pub(crate) avio_buffer_size: usize,
    pub(crate) initial_pcm_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            clock_smoothing: 0.15,
            fallback_frame_duration: 1.0 / 30.0,
            max_frames_per_tick: 64,
            audio_enabled: true,
            audio_resync_threshold: 0.1,
            fade_out_duration: 6.0,
            avio_buffer_size: 32 * 1024,
            initial_pcm_capacity: 1024 * 1024,
        }
    }
}

impl PlaybackConfig {
    /// Weight of the high-resolution wall-clock delta when advancing the
    /// playback clock; the remainder comes from the host's `dt`.
    /// Clamped to `[0, 1]`.
    pub fn set_clock_smoothing(mut self, alpha: f64) -> Self {
        self.clock_smoothing = alpha.clamp(0.0, 1.0);
        self
    }

    /// Frame duration used when the stream does not declare a frame rate.
    pub fn set_fallback_frame_duration(mut self, seconds: f64) -> Self {
        if seconds > 0.0 {
            self.fallback_frame_duration = seconds;
        }
        self
    }

    /// Upper bound of decode attempts within one `update` call. Hitting it
    /// yields a stall warning instead of looping on.
    pub fn set_max_frames_per_tick(mut self, max_frames: usize) -> Self {
        self.max_frames_per_tick = max_frames.max(1);
        self
    }

    pub fn set_audio_enabled(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    /// Drift between track position and playback clock above which the track
    /// is repositioned when it starts.
    pub fn set_audio_resync_threshold(mut self, seconds: f64) -> Self {
        self.audio_resync_threshold = seconds.max(0.0);
        self
    }

    /// Duration of the audio fade-out started at end of stream. `0` stops the
    /// track immediately.
    pub fn set_fade_out_duration(mut self, seconds: f64) -> Self {
        self.fade_out_duration = seconds.max(0.0);
        self
    }

    /// Clamped to `4096..=c_int::MAX`, the range `avio_alloc_context` accepts.
    pub fn set_avio_buffer_size(mut self, size: usize) -> Self {
        self.avio_buffer_size = size.clamp(4096, libc::c_int::MAX as usize);
        self
    }

    pub fn set_initial_pcm_capacity(mut self, size: usize) -> Self {
        self.initial_pcm_capacity = size.max(AUDIO_BYTES_PER_FRAME);
        self
    }

    pub fn clock_smoothing(&self) -> f64 {
        self.clock_smoothing
    }

    pub fn fallback_frame_duration(&self) -> f64 {
        self.fallback_frame_duration
    }

    pub fn max_frames_per_tick(&self) -> usize {
        self.max_frames_per_tick
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn fade_out_duration(&self) -> f64 {
        self.fade_out_duration
    }
}
