//! Deterministic doubles for the host collaborators and the media source.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;
use ffmpeg_next::format::Pixel;

use crate::core::audio::{AudioSink, PcmAsset, PcmBuffer};
use crate::core::converter::PlanarYuvFrame;
use crate::core::demuxer::{DecodeStatus, TimedFrame, VideoInfo};
use crate::core::media::MediaSource;
use crate::core::pacing::{FrameSource, WallClock};
use crate::core::render::{DestRect, RenderSink};
use crate::core::storage::{ByteProvider, StorageKind};
use crate::core::stream_info::StreamInfo;
use crate::error::{AudioError, ConversionError, DecodeError, RenderError, StorageError};

/// Wall clock returning a fixed, adjustable step on every call.
#[derive(Clone)]
pub(crate) struct ManualClock {
    step: Rc<Cell<f64>>,
}

impl ManualClock {
    pub(crate) fn new(step: f64) -> Self {
        Self {
            step: Rc::new(Cell::new(step)),
        }
    }

    pub(crate) fn set(&self, step: f64) {
        self.step.set(step);
    }
}

impl WallClock for ManualClock {
    fn elapsed(&mut self) -> f64 {
        self.step.get()
    }

    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Scripted {
    Frame(f64),
    Untimed,
    Pending,
    Error,
}

/// Media source replaying a fixed script. Frames are numbered in order.
pub(crate) struct ScriptedSource {
    script: Vec<Scripted>,
    cursor: usize,
    calls: Rc<Cell<usize>>,
    info: VideoInfo,
    audio: Option<PcmAsset>,
    fail_convert: bool,
}

impl ScriptedSource {
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self {
            script,
            cursor: 0,
            calls: Rc::new(Cell::new(0)),
            info: VideoInfo {
                width: 64,
                height: 36,
                pixel_format: Pixel::YUV420P,
                frame_duration: 0.1,
                codec_name: "scripted".to_string(),
            },
            audio: None,
            fail_convert: false,
        }
    }

    pub(crate) fn frames(pts: &[f64]) -> Self {
        Self::new(pts.iter().map(|&p| Scripted::Frame(p)).collect())
    }

    pub(crate) fn with_audio(mut self, seconds: f64) -> Self {
        self.audio = Some(pcm_asset(seconds));
        self
    }

    pub(crate) fn with_frame_duration(mut self, seconds: f64) -> Self {
        self.info.frame_duration = seconds;
        self
    }

    pub(crate) fn failing_conversion(mut self) -> Self {
        self.fail_convert = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Shared call counter that survives moving the source into a session.
    pub(crate) fn call_counter(&self) -> Rc<Cell<usize>> {
        self.calls.clone()
    }
}

impl FrameSource for ScriptedSource {
    type Frame = u32;

    fn next_frame(&mut self) -> Result<DecodeStatus<u32>, DecodeError> {
        self.calls.set(self.calls.get() + 1);
        let Some(step) = self.script.get(self.cursor).copied() else {
            return Ok(DecodeStatus::Eof);
        };
        let frame = self.cursor as u32;
        self.cursor += 1;
        match step {
            Scripted::Frame(pts) => Ok(DecodeStatus::Frame(TimedFrame {
                pts: Some(pts),
                frame,
            })),
            Scripted::Untimed => Ok(DecodeStatus::Frame(TimedFrame { pts: None, frame })),
            Scripted::Pending => Ok(DecodeStatus::Pending),
            Scripted::Error => Err(DecodeError::ReadPacket(crate::error::io_error())),
        }
    }
}

impl MediaSource for ScriptedSource {
    fn video_info(&self) -> &VideoInfo {
        &self.info
    }

    fn streams(&self) -> &[StreamInfo] {
        &[]
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.script.iter().rev().find_map(|s| match s {
            Scripted::Frame(pts) => Some(pts + self.info.frame_duration),
            _ => None,
        })
    }

    fn convert(&mut self, _frame: &u32, dst: &mut PlanarYuvFrame) -> Result<(), ConversionError> {
        if self.fail_convert {
            return Err(ConversionError::UnsupportedFormat(Pixel::None));
        }
        if dst.width() != self.info.width || dst.height() != self.info.height {
            *dst = PlanarYuvFrame::new(self.info.width, self.info.height);
        }
        Ok(())
    }

    fn take_audio(&mut self) -> Option<PcmAsset> {
        self.audio.take()
    }
}

pub(crate) fn pcm_asset(seconds: f64) -> PcmAsset {
    let bytes = (seconds * 44_100.0) as usize * 4;
    let mut pcm = PcmBuffer::with_capacity(bytes.max(4));
    pcm.append(&vec![0; bytes.max(4)]);
    match pcm.into_asset() {
        Some(asset) => asset,
        None => unreachable!("non-empty buffer"),
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct MockTexture {
    pub(crate) id: usize,
}

/// Renderer counting texture lifetimes, uploads and blits.
#[derive(Default)]
pub(crate) struct CountingRenderer {
    pub(crate) logical: (i32, i32),
    pub(crate) created: usize,
    pub(crate) destroyed: usize,
    /// Texture id of every upload, in order.
    pub(crate) uploads: Vec<usize>,
    pub(crate) blits: Vec<(usize, DestRect)>,
    /// Fail the n-th (1-based) texture creation.
    pub(crate) fail_create_at: Option<usize>,
}

impl CountingRenderer {
    pub(crate) fn with_logical_size(w: i32, h: i32) -> Self {
        Self {
            logical: (w, h),
            ..Default::default()
        }
    }

    pub(crate) fn live_textures(&self) -> usize {
        self.created - self.destroyed
    }
}

impl RenderSink for CountingRenderer {
    type Texture = MockTexture;

    fn create_texture(&mut self, _width: u32, _height: u32) -> Result<MockTexture, RenderError> {
        if self.fail_create_at == Some(self.created + 1) {
            return Err(RenderError::CreateTexture("injected failure".to_string()));
        }
        self.created += 1;
        Ok(MockTexture { id: self.created })
    }

    fn upload_yuv(&mut self, texture: &mut MockTexture, _frame: &PlanarYuvFrame) -> Result<(), RenderError> {
        self.uploads.push(texture.id);
        Ok(())
    }

    fn logical_size(&self) -> (i32, i32) {
        self.logical
    }

    fn blit(&mut self, texture: &MockTexture, dest: DestRect) -> Result<(), RenderError> {
        self.blits.push((texture.id, dest));
        Ok(())
    }

    fn destroy_texture(&mut self, _texture: MockTexture) {
        self.destroyed += 1;
    }
}

#[derive(Debug)]
pub(crate) struct MockTrack;

/// Mixer whose transport position is set by the test.
#[derive(Default)]
pub(crate) struct MockMixer {
    pub(crate) position: Option<f64>,
    pub(crate) created: usize,
    pub(crate) destroyed: usize,
    pub(crate) plays: usize,
    pub(crate) stops: usize,
    pub(crate) gains: Vec<f32>,
    pub(crate) seeks: Vec<f64>,
    pub(crate) fail_create: bool,
}

impl MockMixer {
    pub(crate) fn live_tracks(&self) -> usize {
        self.created - self.destroyed
    }
}

impl AudioSink for MockMixer {
    type Track = MockTrack;

    fn create_track(&mut self, _asset: &PcmAsset) -> Result<MockTrack, AudioError> {
        if self.fail_create {
            return Err(AudioError::Mixer("injected failure".to_string()));
        }
        self.created += 1;
        Ok(MockTrack)
    }

    fn play(&mut self, _track: &mut MockTrack) -> Result<(), AudioError> {
        self.plays += 1;
        Ok(())
    }

    fn pause(&mut self, _track: &mut MockTrack) {}

    fn stop(&mut self, _track: &mut MockTrack) {
        self.stops += 1;
    }

    fn set_gain(&mut self, _track: &mut MockTrack, gain: f32) {
        self.gains.push(gain);
    }

    fn playback_position_seconds(&self, _track: &MockTrack) -> Option<f64> {
        self.position
    }

    fn set_playback_position(&mut self, _track: &mut MockTrack, seconds: f64) {
        self.seeks.push(seconds);
        self.position = Some(seconds);
    }

    fn destroy_track(&mut self, _track: MockTrack) {
        self.destroyed += 1;
    }
}

/// In-memory [`ByteProvider`].
#[derive(Default)]
pub(crate) struct MemoryProvider {
    files: HashMap<String, Bytes>,
}

impl MemoryProvider {
    pub(crate) fn with_file(path: &str, data: &'static [u8]) -> Self {
        let mut files = HashMap::new();
        files.insert(path.to_string(), Bytes::from_static(data));
        Self { files }
    }
}

impl ByteProvider for MemoryProvider {
    fn read_all(&self, path: &str, _kind: StorageKind) -> Result<Bytes, StorageError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}
