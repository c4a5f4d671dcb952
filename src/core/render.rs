use crate::core::converter::PlanarYuvFrame;
use crate::error::RenderError;

/// Destination rectangle in logical presentation coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DestRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Host renderer interface.
///
/// Textures are created and destroyed only through this trait, so the host
/// keeps ownership of every GPU resource.
pub trait RenderSink {
    type Texture;

    /// Creates a planar YUV texture of the given size.
    fn create_texture(&mut self, width: u32, height: u32) -> Result<Self::Texture, RenderError>;

    fn upload_yuv(
        &mut self,
        texture: &mut Self::Texture,
        frame: &PlanarYuvFrame,
    ) -> Result<(), RenderError>;

    /// Logical presentation size. Non-positive values mean "not set".
    fn logical_size(&self) -> (i32, i32);

    fn blit(&mut self, texture: &Self::Texture, dest: DestRect) -> Result<(), RenderError>;

    fn destroy_texture(&mut self, texture: Self::Texture);
}

/// Fits a `video_w` x `video_h` picture into the logical canvas while
/// preserving its aspect ratio, centered on the cropped axis.
///
/// A degenerate video size fills the whole canvas.
pub fn letterbox(video_w: u32, video_h: u32, logical_w: u32, logical_h: u32) -> DestRect {
    let (vw, vh) = (video_w as f64, video_h as f64);
    let (lw, lh) = (logical_w as f64, logical_h as f64);
    if video_w == 0 || video_h == 0 {
        return DestRect {
            x: 0.0,
            y: 0.0,
            w: lw as f32,
            h: lh as f32,
        };
    }

    // Aspect ratios compared by cross-multiplication to stay exact.
    if vw * lh > lw * vh {
        let h = lw * vh / vw;
        DestRect {
            x: 0.0,
            y: ((lh - h) / 2.0) as f32,
            w: lw as f32,
            h: h as f32,
        }
    } else {
        let w = lh * vw / vh;
        DestRect {
            x: ((lw - w) / 2.0) as f32,
            y: 0.0,
            w: w as f32,
            h: lh as f32,
        }
    }
}
