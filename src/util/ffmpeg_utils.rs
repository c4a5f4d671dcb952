use std::ffi::CStr;

use ffmpeg_next::Rational;
use ffmpeg_sys_next::{av_strerror, AV_ERROR_MAX_STRING_SIZE, AV_NOPTS_VALUE};

/// Renders an AVERROR code as FFmpeg's human-readable message.
pub(crate) fn av_err2str(err_code: i32) -> String {
    let mut buf = [0 as libc::c_char; AV_ERROR_MAX_STRING_SIZE as usize];
    // SAFETY: buf is a valid, writable buffer of the declared size;
    // av_strerror always NUL-terminates within that size.
    unsafe {
        if av_strerror(err_code, buf.as_mut_ptr(), buf.len()) < 0 {
            return format!("Unknown error {err_code}");
        }
        CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
    }
}

/// Converts a rational time base to seconds per tick. A zero denominator
/// yields `0.0` rather than infinity.
pub(crate) fn rational_to_seconds(r: Rational) -> f64 {
    if r.denominator() == 0 {
        0.0
    } else {
        r.numerator() as f64 / r.denominator() as f64
    }
}

/// Converts a stream-local timestamp to seconds. `None` for `AV_NOPTS_VALUE`.
pub(crate) fn ts_to_seconds(ts: i64, time_base: Rational) -> Option<f64> {
    if ts == AV_NOPTS_VALUE {
        return None;
    }
    Some(ts as f64 * rational_to_seconds(time_base))
}
