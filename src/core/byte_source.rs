use std::ffi::c_void;
use std::ptr::null_mut;

use bytes::Bytes;
use ffmpeg_sys_next::{
    av_free, av_malloc, avio_alloc_context, avio_context_free, AVIOContext, AVERROR_EOF,
    AVSEEK_FORCE, AVSEEK_SIZE,
};
use libc::{c_int, SEEK_CUR, SEEK_END, SEEK_SET};

use crate::error::{invalid_argument, io_error, OpenError};

/// An immutable, reference-counted media buffer handed to the demuxer.
///
/// Ownership discipline is copy-on-open: a borrowed slice is always copied
/// into a buffer owned by the source, and an owned [`Bytes`] is moved in.
/// Either way the caller may free its own buffer as soon as the constructor
/// returns; the session never reads memory it does not hold a reference to.
#[derive(Clone)]
pub struct ByteSource {
    data: Bytes,
}

impl ByteSource {
    /// Copies `data` into a buffer owned by the source.
    pub fn copy_from_slice(data: &[u8]) -> Result<Self, OpenError> {
        if data.is_empty() {
            return Err(OpenError::EmptyBuffer);
        }
        Ok(Self {
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Takes a reference to an already owned buffer without copying it.
    pub fn from_bytes(data: Bytes) -> Result<Self, OpenError> {
        if data.is_empty() {
            return Err(OpenError::EmptyBuffer);
        }
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn cursor(&self) -> ByteCursor {
        ByteCursor {
            data: self.data.clone(),
            pos: 0,
        }
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource").field("len", &self.data.len()).finish()
    }
}

/// Read/seek position over a [`ByteSource`], in the shape AVIO expects.
///
/// `read` returns `AVERROR_EOF` at the end of the buffer and `seek` answers
/// `AVSEEK_SIZE` queries, so containers that keep their index at the end of
/// the file (e.g. a trailing `moov` atom) can seek backwards to re-read it.
pub struct ByteCursor {
    data: Bytes,
    pos: u64,
}

impl ByteCursor {
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies up to `buf.len()` bytes. Returns the number of bytes copied or
    /// `AVERROR_EOF` when nothing is left.
    pub fn read(&mut self, buf: &mut [u8]) -> c_int {
        let remaining = self.len().saturating_sub(self.pos) as usize;
        if remaining == 0 {
            return AVERROR_EOF;
        }
        // AVIO buffers are c_int sized; never report more than fits.
        let n = remaining.min(buf.len()).min(c_int::MAX as usize);
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        n as c_int
    }

    /// Seeks following `lseek` semantics. Returns the new position, the total
    /// size for `AVSEEK_SIZE`, or a negative AVERROR.
    pub fn seek(&mut self, offset: i64, whence: c_int) -> i64 {
        let whence = whence & !(AVSEEK_FORCE as c_int);
        if whence == AVSEEK_SIZE as c_int {
            return self.len() as i64;
        }

        let base = match whence {
            SEEK_SET => 0i64,
            SEEK_CUR => self.pos as i64,
            SEEK_END => self.len() as i64,
            _ => return invalid_argument() as i64,
        };

        let target = match base.checked_add(offset) {
            Some(target) if target >= 0 && target <= self.len() as i64 => target,
            _ => return invalid_argument() as i64,
        };
        self.pos = target as u64;
        target
    }
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if opaque.is_null() || buf.is_null() || buf_size <= 0 {
        return io_error();
    }
    // SAFETY: opaque is the ByteCursor leaked in AvioContextBox::new and is
    // only reclaimed after the AVIO context is freed. FFmpeg guarantees buf
    // points to buf_size writable bytes.
    let cursor = &mut *(opaque as *mut ByteCursor);
    let out = std::slice::from_raw_parts_mut(buf, buf_size as usize);
    cursor.read(out)
}

unsafe extern "C" fn seek_packet(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    if opaque.is_null() {
        return io_error() as i64;
    }
    // SAFETY: see read_packet.
    let cursor = &mut *(opaque as *mut ByteCursor);
    cursor.seek(offset, whence)
}

/// Owns a custom read-only `AVIOContext` reading from a [`ByteCursor`].
///
/// The format context using it must be closed before this box is dropped;
/// [`crate::core::context::InputContext`] enforces that order.
pub(crate) struct AvioContextBox {
    pub(crate) avio_ctx: *mut AVIOContext,
    opaque: *mut ByteCursor,
}

// SAFETY: the AVIO context and its cursor are exclusively owned and only
// moved between threads, never shared.
unsafe impl Send for AvioContextBox {}

impl AvioContextBox {
    pub(crate) fn new(source: &ByteSource, buffer_size: usize) -> Result<Self, OpenError> {
        let opaque = Box::into_raw(Box::new(source.cursor()));

        // SAFETY: every allocation is released on every error path. On success
        // the AVIO context owns `buffer` (possibly reallocated by FFmpeg) and
        // Drop frees it through (*avio_ctx).buffer.
        unsafe {
            let buffer = av_malloc(buffer_size) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(opaque));
                return Err(OpenError::AllocationFailed("avio buffer"));
            }

            let avio_ctx = avio_alloc_context(
                buffer,
                buffer_size as c_int,
                0,
                opaque as *mut c_void,
                Some(read_packet),
                None,
                Some(seek_packet),
            );
            if avio_ctx.is_null() {
                av_free(buffer as *mut c_void);
                drop(Box::from_raw(opaque));
                return Err(OpenError::AllocationFailed("avio context"));
            }

            Ok(Self { avio_ctx, opaque })
        }
    }
}

impl Drop for AvioContextBox {
    fn drop(&mut self) {
        // SAFETY: avio_ctx and opaque were created in new() and are released
        // exactly once here; both are nulled afterwards.
        unsafe {
            if !self.avio_ctx.is_null() {
                let mut buffer = (*self.avio_ctx).buffer;
                if !buffer.is_null() {
                    ffmpeg_sys_next::av_freep(&mut buffer as *mut *mut u8 as *mut c_void);
                    (*self.avio_ctx).buffer = null_mut();
                }
                avio_context_free(&mut self.avio_ctx);
            }
            if !self.opaque.is_null() {
                drop(Box::from_raw(self.opaque));
                self.opaque = null_mut();
            }
        }
    }
}
