//! The media-engine capability contract.
//!
//! The player never touches decoders, devices, or graphs directly; it only
//! consumes the traits in this module. An engine supplies:
//!
//! - a **graph** per playback session, with a shared mix point all sources
//!   feed into and a four-level state machine
//!   (stopped / ready / paused / playing),
//! - **source nodes**, one per playable unit, linked into the mix point,
//! - an asynchronous **bus** of typed messages delivered over a channel.
//!
//! Two implementations ship with the crate: [`mock`] (deterministic,
//! scripted, used by the test suites) and [`local`] (file playback through
//! symphonia/cpal).

pub mod local;
pub mod mock;

use crate::error::Result;
use crate::properties::{PositionUnit, Transports};
use crate::tags::TagList;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Identity of an engine object (a source sub-graph root or the mix point).
///
/// Bus messages that originate inside a source sub-graph carry the
/// sub-graph root's id, which is how the player attributes them to the
/// current or the next stream.
pub type ObjectId = uuid::Uuid;

/// Engine state levels, per sub-graph and for the whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// No resources held.
    Stopped,
    /// Resources acquired, nothing flowing.
    Ready,
    /// Prerolled and ready to run.
    Paused,
    /// Data is flowing.
    Playing,
}

impl Level {
    pub fn name(&self) -> &'static str {
        match self {
            Level::Stopped => "stopped",
            Level::Ready => "ready",
            Level::Paused => "paused",
            Level::Playing => "playing",
        }
    }
}

/// Application-defined bus events, used to decouple delivery-thread hooks
/// from heavier processing on the loop thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The end-of-stream hook of the audible source fired; wake the loop so
    /// it promotes the next stream.
    StreamEosObserved,
    /// A source's output appeared; seekability and liveness can be queried
    /// now.
    SourceOutputReady { origin: ObjectId },
}

/// Messages delivered on the engine bus, in order.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A new unit actually started playing at the mix point.
    StreamStart,
    /// The last unit finished; nothing is flowing anymore.
    EndOfStream,
    /// The whole graph changed level. `pending` is the level still being
    /// worked towards, or `None` once the change settled.
    LevelChanged {
        old: Level,
        new: Level,
        pending: Option<Level>,
    },
    /// Metadata announced from within a source sub-graph.
    Tags { origin: ObjectId, tags: TagList },
    /// Stream buffer fill report, 0-100.
    Buffering { origin: ObjectId, percent: u32 },
    /// A duration may have changed; `origin` is the posting object.
    DurationChanged { origin: Option<ObjectId> },
    /// The graph's latency needs recalculating.
    Latency,
    /// An element asks for a level change (e.g. a sink reacting to device
    /// events).
    RequestLevel(Level),
    Info {
        origin: Option<ObjectId>,
        message: String,
    },
    Warning {
        origin: Option<ObjectId>,
        message: String,
    },
    /// Errors are not recoverable; the player tears the graph down and
    /// rebuilds it.
    Error {
        origin: Option<ObjectId>,
        message: String,
    },
    Application(AppEvent),
}

/// Sender half of the engine bus.
pub type BusSender = crossbeam_channel::Sender<BusMessage>;

/// Non-blocking hook invoked on the engine's delivery thread when the
/// audible source reaches end-of-stream. Must not block and must not touch
/// engine state.
pub type EosHook = Box<dyn Fn() + Send + Sync>;

/// Connection-level settings for a new source.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub jitter_buffer_length: Duration,
    pub allow_retransmission: bool,
    pub allowed_transports: Transports,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            jitter_buffer_length: crate::properties::JITTER_BUFFER_LENGTH_DEFAULT,
            allow_retransmission: true,
            allowed_transports: Transports::default(),
        }
    }
}

/// Buffering limits applied to a source's stream buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub size_limit_bytes: u32,
    /// `None` disables the buffering timeout.
    pub timeout: Option<Duration>,
    pub low_percent: u32,
    pub high_percent: u32,
}

/// A media engine: a factory for playback graphs.
pub trait MediaEngine: Send + Sync {
    /// Builds a fresh graph. All asynchronous outcomes are posted to `bus`.
    fn create_graph(&self, bus: BusSender) -> Result<Box<dyn EngineGraph>>;
}

/// One playback graph: a shared mix point, a sink, and any number of
/// attached sources.
pub trait EngineGraph: Send {
    /// Builds a source sub-graph for `uri` and links it into the mix point.
    /// Sources play in the order they were added.
    fn add_source(&mut self, uri: &str, settings: &SourceSettings) -> Result<Box<dyn SourceNode>>;

    /// Requests a level change for the whole graph. May complete
    /// asynchronously (reported via [`BusMessage::LevelChanged`]), except
    /// for [`Level::Stopped`], which always completes before returning.
    fn request_level(&mut self, level: Level) -> Result<()>;

    /// Current position of the audible source, or `None` if unknown.
    fn query_position(&self, unit: PositionUnit) -> Option<i64>;

    /// Duration of the audible source, or `None` if unknown.
    fn query_duration(&self, unit: PositionUnit) -> Option<i64>;

    /// Seeks the audible source. The graph must already be at
    /// [`Level::Paused`].
    fn seek(&mut self, position: i64, unit: PositionUnit) -> Result<()>;

    /// Recomputes end-to-end latency after topology changes.
    fn recalculate_latency(&mut self);

    /// Identity of the shared mix point, used to filter messages that would
    /// otherwise leak the next unit's facts early.
    fn mix_point_id(&self) -> ObjectId;
}

/// One source sub-graph, owned by a stream.
///
/// Teardown protocol, driven by the owning stream in this order:
/// [`mark_shutting_down`](SourceNode::mark_shutting_down) →
/// [`detach_mix_point`](SourceNode::detach_mix_point) →
/// [`lock_level`](SourceNode::lock_level) →
/// [`force_stopped`](SourceNode::force_stopped) → drop. Detaching before
/// stopping lets a delivery thread blocked at the mix point observe a flush
/// instead of deadlocking. Implementations must wake any thread parked by
/// [`block_delivery`](SourceNode::block_delivery) during teardown.
pub trait SourceNode: Send {
    /// Root identity of this sub-graph; bus messages from inside it carry
    /// this id as their origin.
    fn id(&self) -> ObjectId;

    /// Installs the end-of-stream hook observed at the source's output
    /// connection point.
    fn set_eos_hook(&mut self, hook: EosHook);

    /// Whether the source supports seeking; `None` until determined.
    fn query_seekable(&self) -> Option<bool>;

    /// Whether the source is live; `None` until determined.
    fn query_live(&self) -> Option<bool>;

    /// Whether this source performs stream buffering at all (network
    /// sources do, plain files do not).
    fn buffers(&self) -> bool;

    /// Applies buffering limits to the source's stream buffer, effective
    /// immediately.
    fn apply_buffer_limits(&self, limits: &BufferLimits);

    /// Current stream buffer fill, in bytes, if the source buffers.
    fn fill_level_bytes(&self) -> Option<u64>;

    /// Parks (or releases) the source's delivery thread. Used to starve a
    /// preloading next source of bandwidth while the current one refills.
    fn block_delivery(&self, block: bool);

    /// Marks every object in the sub-graph as shutting down so late
    /// messages from them can be suppressed.
    fn mark_shutting_down(&self);

    /// Pins the sub-graph's level so graph-wide changes no longer propagate
    /// into it.
    fn lock_level(&self, locked: bool);

    /// Forces the sub-graph to [`Level::Stopped`], synchronously.
    fn force_stopped(&self);

    /// Releases the source's mix-point connection.
    fn detach_mix_point(&self);
}

static INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Process-wide engine support initialization.
///
/// Reference-counted: the first call performs global setup, later calls
/// only increment the count. The built-in engines need no global state, so
/// this is bookkeeping only, but embedders wrapping engines with
/// process-global requirements should still pair [`init`] and [`deinit`]
/// at process boundaries, outside any per-player lock.
pub fn init() {
    if INIT_COUNT.fetch_add(1, Ordering::SeqCst) == 0 {
        log::debug!("engine support initialized");
    }
}

/// Process-wide engine support teardown; the counterpart of [`init`].
pub fn deinit() {
    let previous = INIT_COUNT.fetch_sub(1, Ordering::SeqCst);
    if previous == 0 {
        INIT_COUNT.store(0, Ordering::SeqCst);
        log::warn!("engine deinit without matching init");
    } else if previous == 1 {
        log::debug!("engine support deinitialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(Level::Stopped.name(), "stopped");
        assert_eq!(Level::Playing.name(), "playing");
    }

    #[test]
    fn levels_are_ordered() {
        assert!(Level::Stopped < Level::Ready);
        assert!(Level::Ready < Level::Paused);
        assert!(Level::Paused < Level::Playing);
    }
}
