//! # segue
//!
//! A gapless audio-playback coordinator for Rust.
//!
//! segue sits above a pluggable media engine and manages a *current* and a
//! *next* playable unit so playback can switch between them with no
//! audible gap. The public API never blocks on engine I/O; every outcome
//! arrives through optional callbacks invoked on a dedicated event-loop
//! thread.
//!
//! ## Quick start
//!
//! ```no_run
//! use segue::engine::local::LocalEngine;
//! use segue::{Callbacks, Media, PlaybackProperties, Player};
//! use std::sync::Arc;
//!
//! segue::engine::init();
//!
//! let callbacks = Callbacks::new()
//!     .on_media_started(|media, token| {
//!         eprintln!("started: {} (token {token})", media.uri());
//!     })
//!     .on_end_of_stream(|| eprintln!("end of stream"));
//!
//! let engine = Arc::new(LocalEngine::new());
//! let player = Player::new(engine, callbacks)?;
//!
//! // Play one file now and queue a second for a gapless follow-up.
//! player.play_media(
//!     player.new_token(),
//!     Media::new("file:///music/first.flac"),
//!     true,
//!     PlaybackProperties::default(),
//! );
//! player.play_media(
//!     player.new_token(),
//!     Media::new("file:///music/second.flac"),
//!     false,
//!     PlaybackProperties::default(),
//! );
//!
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! player.stop();
//!
//! drop(player);
//! segue::engine::deinit();
//! # Ok::<(), segue::SegueError>(())
//! ```
//!
//! ## Key components
//!
//! - [`Player`]: the coordinator owning the current/next streams and the
//!   event-loop thread
//! - [`Callbacks`]: optional listener slots for every asynchronous outcome
//! - [`Media`] / [`PlaybackProperties`]: what to play and how
//! - [`engine`]: the capability contract engines implement, plus the
//!   built-in [`engine::local`] file engine and the scripted
//!   [`engine::mock`] engine
//! - [`TagList`]: aggregated metadata deltas
//!
//! ## Threading model
//!
//! Public calls may come from any thread; they serialize with the
//! event-loop thread on one internal lock and either act on local state or
//! record a postponed task. Callbacks run on the event-loop thread and
//! must return promptly.

pub mod engine;
pub mod error;
pub mod media;
pub mod player;
pub mod properties;
pub mod tags;

mod stream;

/// Identifies one playback request, so a replacement for a queued "next"
/// unit can be told apart from an additional request. Obtained from
/// [`Player::new_token`].
pub type Token = u64;

pub use error::{Result, SegueError};
pub use media::Media;
pub use player::{Callbacks, PlaybackState, Player, PlayerConfig};
pub use properties::{PlaybackProperties, PositionUnit, Transports};
pub use tags::{TagList, TagValue};
