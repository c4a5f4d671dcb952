use std::collections::HashMap;
use std::ffi::CStr;
use std::ptr::null_mut;

use ffmpeg_next::Rational;
use ffmpeg_sys_next::AVMediaType::{AVMEDIA_TYPE_AUDIO, AVMEDIA_TYPE_VIDEO};
use ffmpeg_sys_next::{
    av_dict_iterate, avcodec_get_name, AVCodecID, AVDictionary, AVDictionaryEntry, AVStream,
};

use crate::core::byte_source::ByteSource;
use crate::core::config::PlaybackConfig;
use crate::core::context::InputContext;
use crate::error::OpenError;

/// Metadata of one elementary stream, extracted once at open time.
#[derive(Debug, Clone)]
pub enum StreamInfo {
    /// Video stream information
    Video {
        /// The index of the stream within the container.
        index: usize,

        /// Rational conversion factor from stream ticks to seconds.
        time_base: Rational,

        /// The average frame rate; `0/0` when the container does not declare one.
        avg_frame_rate: Rational,

        /// The total duration of the stream, in `time_base` units.
        duration: i64,

        /// The codec identifier used to decode the stream.
        codec_id: AVCodecID,

        /// A human-readable name of the codec.
        codec_name: String,

        /// The width of the video frame in pixels.
        width: u32,

        /// The height of the video frame in pixels.
        height: u32,

        /// The frames per second, derived from `avg_frame_rate`. `0.0` when unknown.
        fps: f64,

        /// Stream metadata such as title or language.
        metadata: HashMap<String, String>,
    },
    /// Audio stream information
    Audio {
        /// The index of the stream within the container.
        index: usize,

        /// Rational conversion factor from stream ticks to seconds.
        time_base: Rational,

        /// The total duration of the stream, in `time_base` units.
        duration: i64,

        /// The codec identifier used to decode the stream.
        codec_id: AVCodecID,

        /// A human-readable name of the codec.
        codec_name: String,

        /// The sample rate in Hz.
        sample_rate: u32,

        /// Number of channels; `0` when the layout is undefined.
        nb_channels: u32,

        /// Stream metadata such as title or language.
        metadata: HashMap<String, String>,
    },
    /// Any stream this player does not consume (subtitles, data, attachments).
    Other {
        /// The index of the stream within the container.
        index: usize,

        /// Stream metadata.
        metadata: HashMap<String, String>,
    },
}

impl StreamInfo {
    /// Returns a human-readable label for this stream's type.
    pub fn stream_type(&self) -> &'static str {
        match self {
            StreamInfo::Video { .. } => "Video",
            StreamInfo::Audio { .. } => "Audio",
            StreamInfo::Other { .. } => "Other",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, StreamInfo::Video { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, StreamInfo::Audio { .. })
    }

    pub fn index(&self) -> usize {
        match self {
            StreamInfo::Video { index, .. }
            | StreamInfo::Audio { index, .. }
            | StreamInfo::Other { index, .. } => *index,
        }
    }

    pub fn codec_name(&self) -> Option<&str> {
        match self {
            StreamInfo::Video { codec_name, .. } | StreamInfo::Audio { codec_name, .. } => {
                Some(codec_name)
            }
            StreamInfo::Other { .. } => None,
        }
    }

    /// Duration of one frame in seconds, or `fallback` when the stream has
    /// no usable frame rate. Only meaningful for video streams.
    pub fn frame_duration(&self, fallback: f64) -> f64 {
        match self {
            StreamInfo::Video { avg_frame_rate, .. }
                if avg_frame_rate.numerator() > 0 && avg_frame_rate.denominator() > 0 =>
            {
                avg_frame_rate.denominator() as f64 / avg_frame_rate.numerator() as f64
            }
            _ => fallback,
        }
    }
}

/// Returns the first video stream, if any.
pub fn first_video_stream(streams: &[StreamInfo]) -> Option<&StreamInfo> {
    streams.iter().find(|s| s.is_video())
}

/// Returns the first audio stream, if any.
pub fn first_audio_stream(streams: &[StreamInfo]) -> Option<&StreamInfo> {
    streams.iter().find(|s| s.is_audio())
}

/// Probes an in-memory container and lists its streams without opening any
/// decoder.
pub fn probe_streams(source: &ByteSource) -> Result<Vec<StreamInfo>, OpenError> {
    let input = InputContext::open(source, PlaybackConfig::default().avio_buffer_size)?;
    Ok(extract_stream_infos(&input))
}

/// Extracts `StreamInfo` for all streams of an opened input.
pub(crate) fn extract_stream_infos(input: &InputContext) -> Vec<StreamInfo> {
    let fmt_ctx = input.fmt_ctx();
    // SAFETY: fmt_ctx is a fully initialised context (open + find_stream_info
    // succeeded). The streams array holds nb_streams entries; each entry is
    // null-checked before dereferencing.
    unsafe {
        let nb_streams = (*fmt_ctx).nb_streams as usize;
        let streams_ptr = (*fmt_ctx).streams;
        if streams_ptr.is_null() {
            return Vec::new();
        }

        (0..nb_streams)
            .map(|i| {
                let raw_stream = *streams_ptr.add(i);
                if raw_stream.is_null() {
                    StreamInfo::Other {
                        index: i,
                        metadata: HashMap::new(),
                    }
                } else {
                    extract_stream_info_from_stream(raw_stream)
                }
            })
            .collect()
    }
}

/// # Safety
/// `raw_stream` must be a valid, non-null pointer to an `AVStream`.
unsafe fn extract_stream_info_from_stream(raw_stream: *mut AVStream) -> StreamInfo {
    let stream = &*raw_stream;
    let index = stream.index.max(0) as usize;
    let metadata = dict_to_hashmap(stream.metadata);

    if stream.codecpar.is_null() {
        return StreamInfo::Other { index, metadata };
    }
    let codecpar = &*stream.codecpar;
    let codec_id = codecpar.codec_id;
    let time_base = Rational::from(stream.time_base);

    match codecpar.codec_type {
        AVMEDIA_TYPE_VIDEO => {
            let avg_frame_rate = Rational::from(stream.avg_frame_rate);
            let fps = if avg_frame_rate.denominator() == 0 {
                0.0
            } else {
                avg_frame_rate.numerator() as f64 / avg_frame_rate.denominator() as f64
            };
            StreamInfo::Video {
                index,
                time_base,
                avg_frame_rate,
                duration: stream.duration,
                codec_id,
                codec_name: codec_name(codec_id),
                width: codecpar.width.max(0) as u32,
                height: codecpar.height.max(0) as u32,
                fps,
                metadata,
            }
        }
        AVMEDIA_TYPE_AUDIO => StreamInfo::Audio {
            index,
            time_base,
            duration: stream.duration,
            codec_id,
            codec_name: codec_name(codec_id),
            sample_rate: codecpar.sample_rate.max(0) as u32,
            nb_channels: codecpar.ch_layout.nb_channels.max(0) as u32,
            metadata,
        },
        _ => StreamInfo::Other { index, metadata },
    }
}

#[inline]
fn codec_name(id: AVCodecID) -> String {
    // SAFETY: avcodec_get_name is a pure lookup returning a static string
    // for any AVCodecID; null-checked before dereferencing.
    unsafe {
        let ptr = avcodec_get_name(id);
        if ptr.is_null() {
            "Unknown codec".into()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn dict_to_hashmap(dict: *mut AVDictionary) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if dict.is_null() {
        return map;
    }
    // SAFETY: dict is non-null. av_dict_iterate yields entries with valid
    // key/value C strings until it returns null.
    unsafe {
        let mut e: *const AVDictionaryEntry = null_mut();
        while {
            e = av_dict_iterate(dict, e);
            !e.is_null()
        } {
            let k = CStr::from_ptr((*e).key).to_string_lossy().into_owned();
            let v = CStr::from_ptr((*e).value).to_string_lossy().into_owned();
            map.insert(k, v);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(index: usize, avg_frame_rate: Rational) -> StreamInfo {
        StreamInfo::Video {
            index,
            time_base: Rational::new(1, 90_000),
            avg_frame_rate,
            duration: 90_000,
            codec_id: AVCodecID::AV_CODEC_ID_H264,
            codec_name: "h264".to_string(),
            width: 1920,
            height: 1080,
            fps: 25.0,
            metadata: HashMap::new(),
        }
    }

    fn audio(index: usize) -> StreamInfo {
        StreamInfo::Audio {
            index,
            time_base: Rational::new(1, 48_000),
            duration: 48_000,
            codec_id: AVCodecID::AV_CODEC_ID_AAC,
            codec_name: "aac".to_string(),
            sample_rate: 48_000,
            nb_channels: 2,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_first_streams_selected() {
        let streams = vec![
            StreamInfo::Other { index: 0, metadata: HashMap::new() },
            audio(1),
            video(2, Rational::new(25, 1)),
            video(3, Rational::new(30, 1)),
            audio(4),
        ];
        assert_eq!(first_video_stream(&streams).map(StreamInfo::index), Some(2));
        assert_eq!(first_audio_stream(&streams).map(StreamInfo::index), Some(1));
    }

    #[test]
    fn test_no_video_stream() {
        let streams = vec![audio(0)];
        assert!(first_video_stream(&streams).is_none());
    }

    #[test]
    fn test_frame_duration_from_rate() {
        let stream = video(0, Rational::new(25, 1));
        assert!((stream.frame_duration(1.0 / 30.0) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_frame_duration_fallback() {
        let stream = video(0, Rational::new(0, 0));
        assert_eq!(stream.frame_duration(1.0 / 30.0), 1.0 / 30.0);
        assert_eq!(audio(1).frame_duration(0.5), 0.5);
    }

    #[test]
    fn test_stream_type_labels() {
        assert_eq!(video(0, Rational::new(25, 1)).stream_type(), "Video");
        assert_eq!(audio(0).stream_type(), "Audio");
        assert_eq!(audio(0).codec_name(), Some("aac"));
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let source = ByteSource::copy_from_slice(&[0u8; 64]).unwrap();
        assert!(probe_streams(&source).is_err());
    }

    #[test]
    #[ignore] // Requires test.mp4 in the crate root
    fn test_probe_test_file() {
        let data = std::fs::read("test.mp4").unwrap();
        let source = ByteSource::copy_from_slice(&data).unwrap();
        let streams = probe_streams(&source).unwrap();
        assert!(first_video_stream(&streams).is_some());
        for stream in streams {
            println!("{:?}", stream);
        }
    }
}
