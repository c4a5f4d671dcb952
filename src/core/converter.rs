use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use ffmpeg_next::software::scaling::{self, Flags};
use log::{error, info};

use crate::error::ConversionError;

/// Output pixel format of the converter: 8-bit planar 4:2:0.
pub const OUTPUT_FORMAT: Pixel = Pixel::YUV420P;

/// A tightly packed YUV 4:2:0 picture ready for upload.
///
/// Plane strides equal their widths: `width` for luma and
/// `(width + 1) / 2` for both chroma planes.
#[derive(Debug, Clone, Default)]
pub struct PlanarYuvFrame {
    width: u32,
    height: u32,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl PlanarYuvFrame {
    /// Allocates planes for a `width` x `height` picture, filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        let (luma, chroma) = plane_sizes(width, height);
        Self {
            width,
            height,
            y: vec![16; luma],
            u: vec![128; chroma],
            v: vec![128; chroma],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    pub fn v(&self) -> &[u8] {
        &self.v
    }

    pub fn y_pitch(&self) -> usize {
        self.width as usize
    }

    pub fn uv_pitch(&self) -> usize {
        chroma_len(self.width)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        *self = Self::new(width, height);
    }
}

fn chroma_len(n: u32) -> usize {
    (n as usize + 1) / 2
}

fn plane_sizes(width: u32, height: u32) -> (usize, usize) {
    let luma = width as usize * height as usize;
    let chroma = chroma_len(width) * chroma_len(height);
    (luma, chroma)
}

/// Converts decoded frames to [`OUTPUT_FORMAT`] at their native size.
///
/// The scaling context is created once for the stream's pixel format and
/// reused for every frame. It is only rebuilt if a decoder starts emitting a
/// different pixel format mid-stream.
pub struct YuvConverter {
    scaler: Option<scaling::Context>,
    src_format: Pixel,
    width: u32,
    height: u32,
    scratch: frame::Video,
}

impl YuvConverter {
    pub fn new(src_format: Pixel, width: u32, height: u32) -> Result<Self, ConversionError> {
        // Some decoders only report their pixel format with the first frame.
        let scaler = if src_format == Pixel::None {
            None
        } else {
            Some(create_scaler(src_format, width, height)?)
        };
        Ok(Self {
            scaler,
            src_format,
            width,
            height,
            scratch: frame::Video::empty(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Converts `src` into `dst`, reallocating `dst` only if its size differs.
    pub fn convert(
        &mut self,
        src: &frame::Video,
        dst: &mut PlanarYuvFrame,
    ) -> Result<(), ConversionError> {
        if src.width() != self.width || src.height() != self.height {
            return Err(ConversionError::SizeMismatch {
                width: self.width,
                height: self.height,
                found_width: src.width(),
                found_height: src.height(),
            });
        }

        if self.scaler.is_none() || src.format() != self.src_format {
            if self.scaler.is_some() {
                info!(
                    "Pixel format changed from {:?} to {:?}, rebuilding converter",
                    self.src_format,
                    src.format()
                );
            }
            self.scaler = Some(create_scaler(src.format(), self.width, self.height)?);
            self.src_format = src.format();
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(ConversionError::UnsupportedFormat(self.src_format));
        };
        scaler
            .run(src, &mut self.scratch)
            .map_err(ConversionError::Scale)?;

        dst.resize(self.width, self.height);
        let chroma_width = chroma_len(self.width);
        let chroma_height = chroma_len(self.height);
        copy_plane(&self.scratch, 0, self.width as usize, self.height as usize, &mut dst.y);
        copy_plane(&self.scratch, 1, chroma_width, chroma_height, &mut dst.u);
        copy_plane(&self.scratch, 2, chroma_width, chroma_height, &mut dst.v);
        Ok(())
    }
}

fn create_scaler(src_format: Pixel, width: u32, height: u32) -> Result<scaling::Context, ConversionError> {
    scaling::Context::get(
        src_format,
        width,
        height,
        OUTPUT_FORMAT,
        width,
        height,
        Flags::FAST_BILINEAR,
    )
    .map_err(|e| {
        error!("No conversion from {src_format:?} to {OUTPUT_FORMAT:?}: {e}");
        ConversionError::UnsupportedFormat(src_format)
    })
}

/// Copies one plane row by row, dropping the scaler's line padding.
fn copy_plane(src: &frame::Video, plane: usize, row_len: usize, rows: usize, dst: &mut [u8]) {
    let stride = src.stride(plane);
    let data = src.data(plane);
    for (row, out) in dst.chunks_exact_mut(row_len).take(rows).enumerate() {
        let start = row * stride;
        out.copy_from_slice(&data[start..start + row_len]);
    }
}
