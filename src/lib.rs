//! # rc2d-video
//!
//! Software video playback for a 2D engine: demux an in-memory container,
//! decode video and optional audio, convert frames to planar YUV, and pace
//! them against a playback clock that is slaved to the audio track when one
//! is playing.
//!
//! The host supplies three collaborators through an
//! [`EngineContext`](crate::core::session::EngineContext): a
//! [`RenderSink`](crate::core::render::RenderSink) that owns textures, an optional
//! [`AudioSink`](crate::core::audio::AudioSink) mixer, and a
//! [`ByteProvider`](crate::core::storage::ByteProvider) that loads files.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rc2d_video::{EngineContext, FsByteProvider, PlaybackConfig, StorageKind, VideoPlayer};
//!
//! let mut ctx = EngineContext::new(renderer, Some(mixer), Arc::new(FsByteProvider::new("assets")));
//! let mut player = VideoPlayer::new(PlaybackConfig::default());
//! if player.open(&mut ctx, "intro.mp4", StorageKind::Title) == 0 {
//!     while player.update(&mut ctx, dt) == 1 {
//!         player.draw(&mut ctx);
//!     }
//! }
//! player.close(&mut ctx);
//! ```

pub mod core;
pub mod error;
pub mod player;
pub(crate) mod util;

pub use crate::core::config::PlaybackConfig;
pub use crate::core::pacing::{PlaybackState, UpdateStatus};
pub use crate::core::session::{EngineContext, VideoSession};
pub use crate::core::storage::{ByteProvider, FsByteProvider, StorageKind};
pub use crate::player::VideoPlayer;
