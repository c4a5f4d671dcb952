use ffmpeg_next::frame;
use log::{debug, warn};

use crate::core::audio::{PcmAsset, PcmBuffer};
use crate::core::byte_source::ByteSource;
use crate::core::config::PlaybackConfig;
use crate::core::converter::{PlanarYuvFrame, YuvConverter};
use crate::core::demuxer::{DecodeStatus, Demuxer, VideoInfo};
use crate::core::pacing::FrameSource;
use crate::core::stream_info::StreamInfo;
use crate::error::{ConversionError, DecodeError, Result};

/// Everything a session needs from an opened media file.
pub trait MediaSource: FrameSource {
    fn video_info(&self) -> &VideoInfo;

    fn streams(&self) -> &[StreamInfo];

    /// Container duration, if known.
    fn duration_seconds(&self) -> Option<f64>;

    /// Converts a decoded frame to planar YUV at its native size.
    fn convert(
        &mut self,
        frame: &Self::Frame,
        dst: &mut PlanarYuvFrame,
    ) -> std::result::Result<(), ConversionError>;

    /// Takes the predecoded audio, if the file had a usable audio stream.
    fn take_audio(&mut self) -> Option<PcmAsset>;
}

/// FFmpeg-backed [`MediaSource`] over an in-memory container.
pub struct FfmpegMedia {
    // Converter first: it is released before the decoders and the demux
    // context.
    converter: YuvConverter,
    demuxer: Demuxer,
    audio: Option<PcmAsset>,
}

impl FfmpegMedia {
    /// Opens the container, predecodes audio and rewinds to the start.
    ///
    /// Audio problems only cost the audio. A failed rewind is fatal because
    /// video could not start from the first frame.
    pub fn open(source: &ByteSource, config: &PlaybackConfig) -> Result<Self> {
        let mut demuxer = Demuxer::open(source, config)?;
        let info = demuxer.video_info();
        let converter = YuvConverter::new(info.pixel_format, info.width, info.height)?;

        let mut audio = None;
        if demuxer.has_audio() {
            let mut pcm = PcmBuffer::with_capacity(config.initial_pcm_capacity);
            if demuxer.predecode_audio(&mut pcm).is_ok() {
                audio = pcm.into_asset();
                if audio.is_none() {
                    warn!("Audio stream produced no samples, continuing without audio");
                }
            }
            demuxer.rewind()?;
        }

        debug!(
            "Media opened: {} streams, audio {}",
            demuxer.streams().len(),
            if audio.is_some() { "ready" } else { "absent" }
        );
        Ok(Self {
            converter,
            demuxer,
            audio,
        })
    }
}

impl FrameSource for FfmpegMedia {
    type Frame = frame::Video;

    fn next_frame(&mut self) -> std::result::Result<DecodeStatus<frame::Video>, DecodeError> {
        self.demuxer.decode_next_video_frame()
    }
}

impl MediaSource for FfmpegMedia {
    fn video_info(&self) -> &VideoInfo {
        self.demuxer.video_info()
    }

    fn streams(&self) -> &[StreamInfo] {
        self.demuxer.streams()
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.demuxer.duration_seconds()
    }

    fn convert(
        &mut self,
        frame: &frame::Video,
        dst: &mut PlanarYuvFrame,
    ) -> std::result::Result<(), ConversionError> {
        self.converter.convert(frame, dst)
    }

    fn take_audio(&mut self) -> Option<PcmAsset> {
        self.audio.take()
    }
}
