//! Components of the video playback pipeline.
//!
//! Data flows one way: a [`byte_source::ByteSource`] feeds the
//! [`demuxer::Demuxer`], decoded pictures go through the
//! [`converter::YuvConverter`] into the [`ring::TextureRing`], and audio is
//! resampled into a [`audio::PcmBuffer`] handed to the host mixer. The
//! [`pacing::PacingEngine`] decides on every tick whether a frame is shown,
//! held, or dropped, and [`session::VideoSession`] ties it all together.

use std::sync::Once;

use log::error;

pub mod audio;
pub mod byte_source;
pub mod config;
pub(crate) mod context;
pub mod converter;
pub mod demuxer;
pub mod media;
pub mod pacing;
pub mod render;
pub mod ring;
pub mod session;
pub mod storage;
pub mod stream_info;

#[cfg(test)]
pub(crate) mod test_support;

static INIT_FFMPEG: Once = Once::new();

/// Initialises the FFmpeg libraries once per process.
pub(crate) fn initialize_ffmpeg() {
    INIT_FFMPEG.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            error!("FFmpeg initialization failed: {e}");
        }
    });
}
