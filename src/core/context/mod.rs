use std::ptr::{null, null_mut};

use ffmpeg_next::format::context::Input;
use ffmpeg_sys_next::{
    avformat_alloc_context, avformat_close_input, avformat_find_stream_info, avformat_open_input,
    avformat_seek_file, AVFormatContext, AVFMT_FLAG_CUSTOM_IO, AV_NOPTS_VALUE, AV_TIME_BASE,
};
use log::debug;

use crate::core::byte_source::{AvioContextBox, ByteSource};
use crate::error::OpenError;

/// A demux context reading from an in-memory [`ByteSource`].
///
/// Owns both the `AVFormatContext` and the custom `AVIOContext` feeding it,
/// and releases them in that order: the format context is closed first,
/// then the AVIO context, its buffer and the byte cursor.
pub(crate) struct InputContext {
    // Field order is drop order: the format context must close first.
    input: Input,
    _avio: AvioContextBox,
}

impl InputContext {
    /// Probes the container and reads stream headers.
    pub(crate) fn open(source: &ByteSource, avio_buffer_size: usize) -> Result<Self, OpenError> {
        crate::core::initialize_ffmpeg();

        let avio = AvioContextBox::new(source, avio_buffer_size)?;

        // SAFETY: the format context is either wrapped into `Input` (which
        // closes it on drop) or closed on every error path below. On failure
        // avformat_open_input frees the context and nulls the pointer itself.
        // `avio` outlives the format context because it is dropped after
        // `input` in every path.
        unsafe {
            let mut fmt_ctx = avformat_alloc_context();
            if fmt_ctx.is_null() {
                return Err(OpenError::AllocationFailed("format context"));
            }
            (*fmt_ctx).pb = avio.avio_ctx;
            (*fmt_ctx).flags |= AVFMT_FLAG_CUSTOM_IO as i32;

            let ret = avformat_open_input(&mut fmt_ctx, null(), null(), null_mut());
            if ret < 0 {
                if !fmt_ctx.is_null() {
                    avformat_close_input(&mut fmt_ctx);
                }
                return Err(OpenError::from(ret));
            }

            let ret = avformat_find_stream_info(fmt_ctx, null_mut());
            if ret < 0 {
                avformat_close_input(&mut fmt_ctx);
                return Err(OpenError::from(ret));
            }

            debug!("Demux context opened ({} bytes)", source.len());
            Ok(Self {
                input: Input::wrap(fmt_ctx),
                _avio: avio,
            })
        }
    }

    pub(crate) fn input(&self) -> &Input {
        &self.input
    }

    pub(crate) fn input_mut(&mut self) -> &mut Input {
        &mut self.input
    }

    pub(crate) fn fmt_ctx(&self) -> *const AVFormatContext {
        // SAFETY: read-only pointer access to a live context.
        unsafe { self.input().as_ptr() }
    }

    /// Container duration in seconds, if the container declares one.
    pub(crate) fn duration_seconds(&self) -> Option<f64> {
        let duration = self.input().duration();
        if duration <= 0 || duration == AV_NOPTS_VALUE {
            return None;
        }
        Some(duration as f64 / AV_TIME_BASE as f64)
    }

    /// Seeks all streams back to the first keyframe at or before zero.
    pub(crate) fn seek_to_start(&mut self) -> Result<(), i32> {
        // SAFETY: fmt_ctx is valid for the lifetime of self. avformat_seek_file
        // accepts any timestamp and returns a negative value on failure.
        let ret = unsafe { avformat_seek_file(self.input_mut().as_mut_ptr(), -1, i64::MIN, 0, 0, 0) };
        if ret < 0 {
            return Err(ret);
        }
        Ok(())
    }
}
