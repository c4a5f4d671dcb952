use ffmpeg_sys_next::{AVERROR, AVERROR_EOF, AVERROR_INVALIDDATA};
use libc::{EAGAIN, EINVAL, EIO, ENOMEM};

use crate::util::ffmpeg_utils::av_err2str;

/// Result type of this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error of the video playback subsystem.
///
/// Every public operation returns an explicit `Result`; nothing panics across
/// the crate boundary. Each variant wraps the error of the component that
/// produced it so callers can match on the failing stage.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Open video error: {0}")]
    Open(#[from] OpenError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session is not open")]
    NotOpen,
}

/// Failures of `open`. All of them are fatal to the session being opened and
/// are never retried automatically.
#[derive(thiserror::Error, Debug)]
pub enum OpenError {
    #[error("Byte buffer is empty")]
    EmptyBuffer,

    #[error("I/O error while probing input: {}", av_err2str(*.0))]
    Io(i32),

    #[error("Invalid data found when processing input")]
    InvalidData,

    #[error("No video stream found in input")]
    NoVideoStream,

    #[error("Decoder not found for codec {0}")]
    CodecNotFound(String),

    #[error("Failed to open codec: {0}")]
    CodecOpenFailed(ffmpeg_next::Error),

    #[error("Memory allocation failed: {0}")]
    AllocationFailed(&'static str),

    #[error("Rewind after audio predecode failed: {}", av_err2str(*.0))]
    Rewind(i32),

    #[error("Renderer refused display buffer: {0}")]
    Render(#[from] RenderError),
}

impl From<i32> for OpenError {
    fn from(err_code: i32) -> Self {
        if err_code == AVERROR(ENOMEM) {
            OpenError::AllocationFailed("ffmpeg")
        } else if err_code == AVERROR_INVALIDDATA {
            OpenError::InvalidData
        } else {
            OpenError::Io(err_code)
        }
    }
}

/// The source pixel format cannot be converted to planar YUV. Fatal: the
/// session is unusable afterwards.
#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("Unsupported source pixel format {0:?}")]
    UnsupportedFormat(ffmpeg_next::format::Pixel),

    #[error("Frame is {found_width}x{found_height}, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("Scaler failed: {0}")]
    Scale(ffmpeg_next::Error),
}

/// Mid-stream decode failure. Treated as fatal for the remainder of the
/// stream: the session is marked finished.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Read packet failed: {}", av_err2str(*.0))]
    ReadPacket(i32),

    #[error("Send packet to decoder failed: {0}")]
    SendPacket(ffmpeg_next::Error),

    #[error("Receive frame from decoder failed: {0}")]
    ReceiveFrame(ffmpeg_next::Error),
}

impl From<i32> for DecodeError {
    fn from(err_code: i32) -> Self {
        DecodeError::ReadPacket(err_code)
    }
}

/// Audio failures. Always non-fatal: the session degrades to silent video.
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("No audio stream in input")]
    NoAudioStream,

    #[error("Audio decoder unavailable: {0}")]
    Decoder(ffmpeg_next::Error),

    #[error("Resampler failed: {0}")]
    Resample(ffmpeg_next::Error),

    #[error("No mixer available")]
    NoMixer,

    #[error("Mixer rejected track: {0}")]
    Mixer(String),
}

/// Failures reported by the host renderer.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Texture creation failed: {0}")]
    CreateTexture(String),

    #[error("Texture upload failed: {0}")]
    Upload(String),

    #[error("Blit failed: {0}")]
    Blit(String),
}

/// Failures of the byte provider.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Storage backend {0:?} is not ready")]
    NotReady(crate::core::storage::StorageKind),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loader thread exited before delivering a result")]
    Disconnected,
}

/// Classification of raw AVERROR codes used by the AVIO callbacks and the
/// demux loop.
pub(crate) fn is_eof(err_code: i32) -> bool {
    err_code == AVERROR_EOF
}

pub(crate) fn is_again(err_code: i32) -> bool {
    err_code == AVERROR(EAGAIN)
}

pub(crate) fn io_error() -> i32 {
    AVERROR(EIO)
}

pub(crate) fn invalid_argument() -> i32 {
    AVERROR(EINVAL)
}
