use bytes::Bytes;
use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling;
use ffmpeg_next::{frame, ChannelLayout};
use log::{debug, info, warn};

use crate::core::config::{AUDIO_BYTES_PER_FRAME, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use crate::error::AudioError;

/// Output sample format: interleaved signed 16-bit.
pub const OUTPUT_SAMPLE_FORMAT: Sample = Sample::I16(SampleType::Packed);

/// Distance from the end of a track at which it stops driving the clock.
const TRACK_END_EPSILON: f64 = 0.01;

/// Growable PCM byte buffer.
///
/// `used()` never exceeds `size()`. Capacity doubles whenever an append
/// would overflow it.
#[derive(Debug)]
pub struct PcmBuffer {
    data: Vec<u8>,
    size: usize,
}

impl PcmBuffer {
    pub fn with_capacity(size: usize) -> Self {
        let size = size.max(AUDIO_BYTES_PER_FRAME);
        Self {
            data: Vec::with_capacity(size),
            size,
        }
    }

    pub fn append(&mut self, samples: &[u8]) {
        let needed = self.data.len() + samples.len();
        if needed > self.size {
            let mut size = self.size;
            while size < needed {
                size = size.saturating_mul(2);
            }
            self.data.reserve_exact(size - self.data.len());
            self.size = size;
        }
        self.data.extend_from_slice(samples);
        debug_assert!(self.used() <= self.size());
    }

    pub fn used(&self) -> usize {
        self.data.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        pcm_seconds(self.used())
    }

    /// Freezes the buffer into a playable asset. `None` if nothing was decoded.
    pub fn into_asset(self) -> Option<PcmAsset> {
        if self.data.is_empty() {
            return None;
        }
        Some(PcmAsset {
            data: Bytes::from(self.data),
        })
    }
}

fn pcm_seconds(bytes: usize) -> f64 {
    bytes as f64 / (AUDIO_SAMPLE_RATE as f64 * AUDIO_BYTES_PER_FRAME as f64)
}

/// Immutable decoded audio, 44.1 kHz interleaved S16 stereo.
#[derive(Debug, Clone)]
pub struct PcmAsset {
    data: Bytes,
}

impl PcmAsset {
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        AUDIO_SAMPLE_RATE
    }

    pub fn channels(&self) -> u16 {
        AUDIO_CHANNELS
    }

    pub fn duration_seconds(&self) -> f64 {
        pcm_seconds(self.data.len())
    }
}

/// Converts decoded audio frames to the fixed PCM output format.
pub struct AudioResampler {
    ctx: resampling::Context,
}

impl AudioResampler {
    pub fn new(format: Sample, layout: ChannelLayout, rate: u32) -> Result<Self, AudioError> {
        Ok(Self {
            ctx: create_resampler(format, layout, rate)?,
        })
    }

    /// Resamples `frame` and appends the result to `pcm`.
    pub fn resample(&mut self, frame: &frame::Audio, pcm: &mut PcmBuffer) -> Result<(), AudioError> {
        let layout = effective_layout(frame.channel_layout(), frame.channels());
        let input = self.ctx.input();
        if input.format != frame.format() || input.rate != frame.rate() || input.channel_layout != layout {
            info!(
                "Audio input changed to {:?} {} Hz, rebuilding resampler",
                frame.format(),
                frame.rate()
            );
            self.ctx = create_resampler(frame.format(), layout, frame.rate())?;
        }

        let mut output = frame::Audio::empty();
        self.ctx
            .run(frame, &mut output)
            .map_err(AudioError::Resample)?;
        append_samples(&output, pcm);
        Ok(())
    }

    /// Drains samples still buffered inside the resampler.
    pub fn flush(&mut self, pcm: &mut PcmBuffer) -> Result<(), AudioError> {
        loop {
            let mut output = frame::Audio::empty();
            let delay = self
                .ctx
                .flush(&mut output)
                .map_err(AudioError::Resample)?;
            append_samples(&output, pcm);
            if delay.is_none() || output.samples() == 0 {
                return Ok(());
            }
        }
    }
}

fn effective_layout(layout: ChannelLayout, channels: u16) -> ChannelLayout {
    if layout.is_empty() {
        ChannelLayout::default(channels.max(1) as i32)
    } else {
        layout
    }
}

fn create_resampler(
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
) -> Result<resampling::Context, AudioError> {
    let layout = effective_layout(layout, layout.channels().max(0) as u16);
    resampling::Context::get(
        format,
        layout,
        rate,
        OUTPUT_SAMPLE_FORMAT,
        ChannelLayout::STEREO,
        AUDIO_SAMPLE_RATE,
    )
    .map_err(AudioError::Resample)
}

fn append_samples(out: &frame::Audio, pcm: &mut PcmBuffer) {
    let bytes = out.samples() * AUDIO_BYTES_PER_FRAME;
    if bytes == 0 {
        return;
    }
    let data = out.data(0);
    pcm.append(&data[..bytes.min(data.len())]);
}

/// Host mixer interface.
///
/// Tracks are owned by the mixer; the video session only holds handles and
/// returns them through [`AudioSink::destroy_track`].
pub trait AudioSink {
    type Track;

    fn create_track(&mut self, asset: &PcmAsset) -> Result<Self::Track, AudioError>;

    fn play(&mut self, track: &mut Self::Track) -> Result<(), AudioError>;

    fn pause(&mut self, track: &mut Self::Track);

    fn stop(&mut self, track: &mut Self::Track);

    /// Linear gain in `[0, 1]`.
    fn set_gain(&mut self, track: &mut Self::Track, gain: f32);

    /// Transport position in seconds; `None` if the mixer cannot tell.
    fn playback_position_seconds(&self, track: &Self::Track) -> Option<f64>;

    fn set_playback_position(&mut self, track: &mut Self::Track, seconds: f64);

    fn destroy_track(&mut self, track: Self::Track);
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    elapsed: f64,
    duration: f64,
}

/// Links a session's PCM asset to one mixer track.
///
/// Supplies the track position as the playback clock while playing and runs
/// the end-of-stream fade-out.
pub struct AudioTrackBridge<T> {
    asset: Option<PcmAsset>,
    track: Option<T>,
    playing: bool,
    fade: Option<Fade>,
}

impl<T> AudioTrackBridge<T> {
    pub fn new(asset: PcmAsset) -> Self {
        Self {
            asset: Some(asset),
            track: None,
            playing: false,
            fade: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Creates the track if needed, starts it, and repositions it to
    /// `clock_time` when it has drifted by more than `resync_threshold`.
    pub fn start<A>(
        &mut self,
        sink: &mut A,
        clock_time: f64,
        resync_threshold: f64,
    ) -> Result<(), AudioError>
    where
        A: AudioSink<Track = T>,
    {
        if self.track.is_none() {
            let asset = self.asset.as_ref().ok_or(AudioError::NoAudioStream)?;
            self.track = Some(sink.create_track(asset)?);
            debug!("Audio track created ({:.2}s)", asset.duration_seconds());
        }
        let Some(track) = self.track.as_mut() else {
            return Err(AudioError::NoAudioStream);
        };

        sink.play(track)?;
        self.playing = true;

        if let Some(position) = sink.playback_position_seconds(track) {
            if (position - clock_time).abs() > resync_threshold {
                debug!("Audio drift {:.3}s, resyncing to {clock_time:.3}s", position - clock_time);
                sink.set_playback_position(track, clock_time);
            }
        }
        Ok(())
    }

    /// Track position while it is the authoritative clock.
    ///
    /// `None` once the track has played to its end, so a soundtrack shorter
    /// than the picture hands the clock back to the wall/host blend.
    pub fn position<A>(&self, sink: &A) -> Option<f64>
    where
        A: AudioSink<Track = T>,
    {
        if !self.playing || self.fade.is_some() {
            return None;
        }
        let position = self
            .track
            .as_ref()
            .and_then(|track| sink.playback_position_seconds(track))?;
        match self.asset.as_ref() {
            Some(asset) if position >= asset.duration_seconds() - TRACK_END_EPSILON => None,
            _ => Some(position),
        }
    }

    /// Starts the end-of-stream fade. A zero duration stops at once.
    pub fn begin_fade_out<A>(&mut self, sink: &mut A, duration: f64)
    where
        A: AudioSink<Track = T>,
    {
        if !self.playing || self.fade.is_some() {
            return;
        }
        if duration <= 0.0 {
            self.stop(sink);
            return;
        }
        debug!("Audio fade-out over {duration:.1}s");
        self.fade = Some(Fade {
            elapsed: 0.0,
            duration,
        });
    }

    /// Advances the fade by `dt` seconds. Gain follows `(1 - t/d)^2`; the
    /// track is stopped when the fade completes. Returns whether a fade is
    /// still running.
    pub fn tick_fade<A>(&mut self, sink: &mut A, dt: f64) -> bool
    where
        A: AudioSink<Track = T>,
    {
        let Some(mut fade) = self.fade else {
            return false;
        };
        fade.elapsed += dt.max(0.0);
        let t = (fade.elapsed / fade.duration).min(1.0);
        if t >= 1.0 {
            self.stop(sink);
            return false;
        }
        let gain = (1.0 - t) * (1.0 - t);
        if let Some(track) = self.track.as_mut() {
            sink.set_gain(track, gain as f32);
        }
        self.fade = Some(fade);
        true
    }

    fn stop<A>(&mut self, sink: &mut A)
    where
        A: AudioSink<Track = T>,
    {
        if let Some(track) = self.track.as_mut() {
            sink.set_gain(track, 0.0);
            sink.stop(track);
        }
        self.playing = false;
        self.fade = None;
    }

    /// Silences and destroys the track, then drops the PCM asset.
    pub fn release<A>(&mut self, sink: &mut A)
    where
        A: AudioSink<Track = T>,
    {
        if self.track.is_some() {
            self.stop(sink);
        }
        if let Some(track) = self.track.take() {
            sink.destroy_track(track);
        }
        self.asset = None;
    }

    /// Drops the PCM asset when no mixer is left to release the track.
    pub(crate) fn abandon(&mut self) {
        if self.track.is_some() {
            warn!("Audio track abandoned without a mixer to release it");
        }
        self.track = None;
        self.asset = None;
        self.playing = false;
        self.fade = None;
    }
}
