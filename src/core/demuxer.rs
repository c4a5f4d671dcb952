use ffmpeg_next::codec::{self, decoder};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::{frame, Packet, Rational};
use log::{debug, error, info, warn};

use crate::core::audio::{AudioResampler, PcmBuffer};
use crate::core::byte_source::ByteSource;
use crate::core::config::PlaybackConfig;
use crate::core::context::InputContext;
use crate::core::stream_info::{
    extract_stream_infos, first_audio_stream, first_video_stream, StreamInfo,
};
use crate::error::{is_again, is_eof, AudioError, DecodeError, OpenError};
use crate::util::ffmpeg_utils::{av_err2str, ts_to_seconds};

/// A decoded frame together with its presentation time in seconds.
///
/// `pts` is `None` when the container carries no usable timestamp; the
/// pacing engine then presents the frame at the current clock.
#[derive(Debug)]
pub struct TimedFrame<F> {
    pub pts: Option<f64>,
    pub frame: F,
}

/// Outcome of one decode attempt.
#[derive(Debug)]
pub enum DecodeStatus<F> {
    /// One fully decoded frame.
    Frame(TimedFrame<F>),
    /// The decoder accepted input but has no output yet. Call again.
    Pending,
    /// The demuxer hit end of stream and the decoder is drained.
    Eof,
}

/// Properties of the selected video stream, fixed at open time.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: Pixel,
    /// Seconds per frame, from the average frame rate or the configured fallback.
    pub frame_duration: f64,
    pub codec_name: String,
}

struct AudioStream {
    index: usize,
    decoder: decoder::Audio,
}

enum Receive {
    Frame,
    Again,
    Eof,
}

/// Demux and decode bridge over an in-memory container.
///
/// Selects the first video stream and, when audio is enabled, the first audio
/// stream. Video is decoded on demand by [`Demuxer::decode_next_video_frame`];
/// audio is decoded in a single pass by [`Demuxer::predecode_audio`].
pub struct Demuxer {
    // Decoders are declared before the input so they are released first.
    video_decoder: decoder::Video,
    audio: Option<AudioStream>,
    input: InputContext,
    streams: Vec<StreamInfo>,
    video_index: usize,
    video_time_base: Rational,
    info: VideoInfo,
    eof_sent: bool,
}

impl Demuxer {
    /// Probes the container and opens one decoder per selected stream.
    ///
    /// Every resource acquired before a failing step is released before the
    /// error is returned.
    pub fn open(source: &ByteSource, config: &PlaybackConfig) -> Result<Self, OpenError> {
        let input = InputContext::open(source, config.avio_buffer_size)?;
        let streams = extract_stream_infos(&input);

        let Some(video_stream) = first_video_stream(&streams) else {
            error!("No video stream found in input");
            return Err(OpenError::NoVideoStream);
        };
        let video_index = video_stream.index();
        let frame_duration = video_stream.frame_duration(config.fallback_frame_duration);
        let codec_name = video_stream.codec_name().unwrap_or("unknown").to_string();

        let (video_decoder, video_time_base) = open_video_decoder(&input, video_index)?;

        let audio = if config.audio_enabled {
            first_audio_stream(&streams).and_then(|stream| {
                match open_audio_decoder(&input, stream.index()) {
                    Ok(decoder) => Some(AudioStream {
                        index: stream.index(),
                        decoder,
                    }),
                    Err(e) => {
                        warn!("Audio stream {} unusable, continuing without audio: {e}", stream.index());
                        None
                    }
                }
            })
        } else {
            None
        };

        let info = VideoInfo {
            width: video_decoder.width(),
            height: video_decoder.height(),
            pixel_format: video_decoder.format(),
            frame_duration,
            codec_name,
        };

        info!(
            "Opened video stream {video_index}: {} {}x{} ({:.3}s/frame), audio: {}",
            info.codec_name,
            info.width,
            info.height,
            info.frame_duration,
            audio.as_ref().map_or("none".to_string(), |a| format!("stream {}", a.index)),
        );

        Ok(Self {
            video_decoder,
            audio,
            input,
            streams,
            video_index,
            video_time_base,
            info,
            eof_sent: false,
        })
    }

    pub fn video_info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.input.duration_seconds()
    }

    /// Reads packets until the video decoder yields one frame.
    ///
    /// Packets of other streams are skipped. Once the container is exhausted
    /// the decoder is flushed and drained; [`DecodeStatus::Eof`] is returned
    /// when it has nothing left.
    pub fn decode_next_video_frame(&mut self) -> Result<DecodeStatus<frame::Video>, DecodeError> {
        let mut decoded = frame::Video::empty();

        match self.receive_video(&mut decoded)? {
            Receive::Frame => return Ok(self.timed(decoded)),
            Receive::Eof => return Ok(DecodeStatus::Eof),
            Receive::Again if self.eof_sent => return Ok(DecodeStatus::Eof),
            Receive::Again => {}
        }

        let mut packet = Packet::empty();
        loop {
            match packet.read(self.input.input_mut()) {
                Ok(()) => {
                    if packet.stream() != self.video_index {
                        // Audio was fully decoded at open; other streams are ignored.
                        continue;
                    }
                    self.video_decoder
                        .send_packet(&packet)
                        .map_err(DecodeError::SendPacket)?;
                    break;
                }
                Err(e) if is_eof(i32::from(e)) => {
                    debug!("Video stream reached end of input, draining decoder");
                    self.video_decoder
                        .send_eof()
                        .map_err(DecodeError::SendPacket)?;
                    self.eof_sent = true;
                    break;
                }
                Err(e) => return Err(DecodeError::from(i32::from(e))),
            }
        }

        match self.receive_video(&mut decoded)? {
            Receive::Frame => Ok(self.timed(decoded)),
            Receive::Again if !self.eof_sent => Ok(DecodeStatus::Pending),
            Receive::Again | Receive::Eof => Ok(DecodeStatus::Eof),
        }
    }

    fn receive_video(&mut self, decoded: &mut frame::Video) -> Result<Receive, DecodeError> {
        match self.video_decoder.receive_frame(decoded) {
            Ok(()) => Ok(Receive::Frame),
            Err(e) if is_again(i32::from(e)) => Ok(Receive::Again),
            Err(e) if is_eof(i32::from(e)) => Ok(Receive::Eof),
            Err(e) => Err(DecodeError::ReceiveFrame(e)),
        }
    }

    fn timed(&self, frame: frame::Video) -> DecodeStatus<frame::Video> {
        let pts = frame
            .timestamp()
            .or_else(|| frame.pts())
            .and_then(|ts| ts_to_seconds(ts, self.video_time_base));
        DecodeStatus::Frame(TimedFrame { pts, frame })
    }

    /// Decodes the whole audio stream into `pcm`.
    ///
    /// Walks the container once, routing audio packets to the audio decoder
    /// and skipping everything else. The read position is left at the end of
    /// the input; call [`Demuxer::rewind`] before decoding video. On failure
    /// the audio decoder is dropped and the session continues silent.
    pub fn predecode_audio(&mut self, pcm: &mut PcmBuffer) -> Result<(), AudioError> {
        let result = self.predecode_audio_inner(pcm);
        if let Err(e) = &result {
            warn!("Audio predecode failed, continuing without audio: {e}");
            self.audio = None;
        }
        result
    }

    fn predecode_audio_inner(&mut self, pcm: &mut PcmBuffer) -> Result<(), AudioError> {
        let Some(audio) = self.audio.as_mut() else {
            return Err(AudioError::NoAudioStream);
        };
        let decoder = &mut audio.decoder;
        let mut resampler = AudioResampler::new(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
        )?;
        let mut decoded = frame::Audio::empty();
        let mut packet = Packet::empty();

        loop {
            match packet.read(self.input.input_mut()) {
                Ok(()) => {
                    if packet.stream() != audio.index {
                        continue;
                    }
                    if let Err(e) = decoder.send_packet(&packet) {
                        // A corrupt packet only costs its own samples.
                        debug!("Audio packet rejected by decoder: {e}");
                        continue;
                    }
                }
                Err(e) if is_eof(i32::from(e)) => {
                    decoder.send_eof().map_err(AudioError::Decoder)?;
                    drain_audio(decoder, &mut decoded, &mut resampler, pcm)?;
                    break;
                }
                Err(e) => return Err(AudioError::Decoder(e)),
            }
            drain_audio(decoder, &mut decoded, &mut resampler, pcm)?;
        }

        resampler.flush(pcm)?;
        debug!(
            "Audio predecoded: {} bytes ({:.2}s)",
            pcm.used(),
            pcm.duration_seconds()
        );
        Ok(())
    }

    /// Seeks the container back to its start and resets the decoders.
    pub fn rewind(&mut self) -> Result<(), OpenError> {
        self.input.seek_to_start().map_err(|ret| {
            error!("Rewind to start of input failed: {}", av_err2str(ret));
            OpenError::Rewind(ret)
        })?;
        self.video_decoder.flush();
        if let Some(audio) = self.audio.as_mut() {
            audio.decoder.flush();
        }
        self.eof_sent = false;
        Ok(())
    }
}

fn drain_audio(
    decoder: &mut decoder::Audio,
    decoded: &mut frame::Audio,
    resampler: &mut AudioResampler,
    pcm: &mut PcmBuffer,
) -> Result<(), AudioError> {
    loop {
        match decoder.receive_frame(decoded) {
            Ok(()) => resampler.resample(decoded, pcm)?,
            Err(e) if is_again(i32::from(e)) || is_eof(i32::from(e)) => return Ok(()),
            Err(e) => return Err(AudioError::Decoder(e)),
        }
    }
}

fn open_video_decoder(
    input: &InputContext,
    index: usize,
) -> Result<(decoder::Video, Rational), OpenError> {
    let stream = input
        .input()
        .stream(index)
        .ok_or(OpenError::NoVideoStream)?;
    let parameters = stream.parameters();
    let codec_id = parameters.id();

    let codec = find_video_decoder(codec_id)?;

    let context = codec::context::Context::from_parameters(parameters).map_err(|e| {
        error!("Failed to allocate video codec context: {e}");
        OpenError::AllocationFailed("video codec context")
    })?;

    let decoder_name = codec.name().to_string();
    let video = context
        .decoder()
        .open_as(codec)
        .and_then(|opened| opened.video())
        .map_err(|e| {
            error!("Failed to open video decoder {decoder_name}: {e}");
            OpenError::CodecOpenFailed(e)
        })?;

    Ok((video, stream.time_base()))
}

fn find_video_decoder(codec_id: codec::Id) -> Result<ffmpeg_next::Codec, OpenError> {
    decoder::find(codec_id).ok_or_else(|| {
        error!("Decoder not found for video codec {codec_id:?}");
        OpenError::CodecNotFound(format!("{codec_id:?}"))
    })
}

fn open_audio_decoder(input: &InputContext, index: usize) -> Result<decoder::Audio, AudioError> {
    let stream = input.input().stream(index).ok_or(AudioError::NoAudioStream)?;
    let context = codec::context::Context::from_parameters(stream.parameters())
        .map_err(AudioError::Decoder)?;
    context
        .decoder()
        .audio()
        .map_err(AudioError::Decoder)
}
