//! The playback coordinator.
//!
//! [`Player`] owns a current and a next stream above an abstract media
//! engine and switches between them with no audible gap. All
//! outcomes are reported through the optional [`Callbacks`]; no public call
//! blocks on engine I/O. Calls that cannot run while the player is in a
//! transitional state are recorded in a single postponed-task slot and
//! re-attempted once the transition ends.
//!
//! # Threading
//!
//! A dedicated event-loop thread receives engine bus messages and a
//! periodic tick. The loop thread and every public API call serialize on
//! one primary lock, so state is mutated by exactly one thread at a time.
//! Callbacks run on the loop thread with that lock held: return promptly
//! and never call back into the owning [`Player`] from inside a callback.

use crate::engine::{
    AppEvent, BusMessage, BusSender, EngineGraph, Level, MediaEngine, ObjectId, SourceSettings,
};
use crate::error::{Result, SegueError};
use crate::media::Media;
use crate::properties::{JITTER_BUFFER_LENGTH_DEFAULT, PlaybackProperties, PositionUnit};
use crate::stream::{OutputFacts, RetiredIds, Stream, is_retired};
use crate::tags::{TAG_BITRATE, TAG_MAXIMUM_BITRATE, TAG_MINIMUM_BITRATE, TagList, TagValue};
use crate::Token;
use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Player states.
///
/// Some states are transitional: most calls issued during them are
/// postponed rather than applied, and user interfaces should show a wait
/// indicator. [`Player::is_transitioning`] reports this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing loaded, no devices held.
    Idle,
    /// Media is loading; transitional.
    Starting,
    /// Playback is being torn down; transitional.
    Stopping,
    /// A seek is in flight; transitional.
    Seeking,
    /// The current stream refills its buffer; transitional.
    Buffering,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Starting => "starting",
            PlaybackState::Stopping => "stopping",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type MediaCallback = Box<dyn Fn(&Media, Token) + Send>;
type PlainCallback = Box<dyn Fn() + Send>;
type StateChangedCallback = Box<dyn Fn(PlaybackState, PlaybackState) + Send>;
type BufferingUpdatedCallback = Box<dyn Fn(&Media, Token, bool, u32, Option<u64>, u32) + Send>;
type BufferLevelCallback = Box<dyn Fn(&Media, Token, u64, u32) + Send>;
type DurationUpdatedCallback = Box<dyn Fn(&Media, Token, Option<i64>, PositionUnit) + Send>;
type PositionUpdatedCallback = Box<dyn Fn(&Media, Token, i64, PositionUnit) + Send>;
type FlagCallback = Box<dyn Fn(&Media, Token, bool, bool) + Send>;
type NewTagsCallback = Box<dyn Fn(&Media, Token, TagList) + Send>;
type MessageCallback = Box<dyn Fn(&str) + Send>;

/// The set of player callbacks.
///
/// Every slot is optional; an empty slot is simply never called. All
/// callbacks are invoked on the event-loop thread with the player's
/// primary lock held, so they must return promptly and must not call back
/// into the player. Media references are only valid for the duration of
/// the call; clone the media if its values are needed later.
#[derive(Default)]
pub struct Callbacks {
    pub(crate) media_started: Option<MediaCallback>,
    pub(crate) end_of_stream: Option<PlainCallback>,
    pub(crate) state_changed: Option<StateChangedCallback>,
    pub(crate) buffering_updated: Option<BufferingUpdatedCallback>,
    pub(crate) buffer_level: Option<BufferLevelCallback>,
    pub(crate) duration_updated: Option<DurationUpdatedCallback>,
    pub(crate) position_updated: Option<PositionUpdatedCallback>,
    pub(crate) media_about_to_end: Option<MediaCallback>,
    pub(crate) is_seekable: Option<FlagCallback>,
    pub(crate) is_live: Option<FlagCallback>,
    pub(crate) new_tags: Option<NewTagsCallback>,
    pub(crate) info: Option<MessageCallback>,
    pub(crate) warning: Option<MessageCallback>,
    pub(crate) error: Option<MessageCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media became current and started playing.
    pub fn on_media_started(mut self, f: impl Fn(&Media, Token) + Send + 'static) -> Self {
        self.media_started = Some(Box::new(f));
        self
    }

    /// Playback ended and no next media was queued.
    pub fn on_end_of_stream(mut self, f: impl Fn() + Send + 'static) -> Self {
        self.end_of_stream = Some(Box::new(f));
        self
    }

    /// `(old, new)` state transition.
    pub fn on_state_changed(
        mut self,
        f: impl Fn(PlaybackState, PlaybackState) + Send + 'static,
    ) -> Self {
        self.state_changed = Some(Box::new(f));
        self
    }

    /// `(media, token, is_current, percent, fill_bytes, limit_bytes)`
    /// buffering report. Also fires for a live current stream while it
    /// keeps playing; the percentage is informational there.
    pub fn on_buffering_updated(
        mut self,
        f: impl Fn(&Media, Token, bool, u32, Option<u64>, u32) + Send + 'static,
    ) -> Self {
        self.buffering_updated = Some(Box::new(f));
        self
    }

    /// Periodic `(media, token, fill_bytes, limit_bytes)` report for the
    /// current stream.
    pub fn on_buffer_level(
        mut self,
        f: impl Fn(&Media, Token, u64, u32) + Send + 'static,
    ) -> Self {
        self.buffer_level = Some(Box::new(f));
        self
    }

    /// A new duration value for the current media; `None` means the
    /// duration is not known in that unit.
    pub fn on_duration_updated(
        mut self,
        f: impl Fn(&Media, Token, Option<i64>, PositionUnit) + Send + 'static,
    ) -> Self {
        self.duration_updated = Some(Box::new(f));
        self
    }

    /// Periodic playback position report.
    pub fn on_position_updated(
        mut self,
        f: impl Fn(&Media, Token, i64, PositionUnit) + Send + 'static,
    ) -> Self {
        self.position_updated = Some(Box::new(f));
        self
    }

    /// The current media's remaining time fell below the configured
    /// threshold; fired once per media. A good moment to queue the next
    /// one.
    pub fn on_media_about_to_end(mut self, f: impl Fn(&Media, Token) + Send + 'static) -> Self {
        self.media_about_to_end = Some(Box::new(f));
        self
    }

    /// `(media, token, is_current, seekable)`.
    pub fn on_is_seekable(
        mut self,
        f: impl Fn(&Media, Token, bool, bool) + Send + 'static,
    ) -> Self {
        self.is_seekable = Some(Box::new(f));
        self
    }

    /// `(media, token, is_current, live)`. Until liveness is determined a
    /// media is assumed live, and live media cannot pause.
    pub fn on_is_live(mut self, f: impl Fn(&Media, Token, bool, bool) + Send + 'static) -> Self {
        self.is_live = Some(Box::new(f));
        self
    }

    /// Newly seen tags for the current media, already reduced to the delta
    /// against everything reported before.
    pub fn on_new_tags(mut self, f: impl Fn(&Media, Token, TagList) + Send + 'static) -> Self {
        self.new_tags = Some(Box::new(f));
        self
    }

    pub fn on_info(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.info = Some(Box::new(f));
        self
    }

    pub fn on_warning(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.warning = Some(Box::new(f));
        self
    }

    /// An engine error. The graph is rebuilt right after this fires; the
    /// failed media is not retried.
    pub fn on_error(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

/// Player tuning knobs.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Period of position/buffer-level updates and postponed-tag flushes.
    pub update_interval: Duration,
    /// Remaining time under which `media_about_to_end` fires.
    pub about_to_end_threshold: Duration,
    /// Deliver all tags with the periodic updates instead of immediately.
    pub postpone_all_tags: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(500),
            about_to_end_threshold: Duration::from_secs(5),
            postpone_all_tags: false,
        }
    }
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn about_to_end_threshold(mut self, threshold: Duration) -> Self {
        self.about_to_end_threshold = threshold;
        self
    }

    pub fn postpone_all_tags(mut self, postpone: bool) -> Self {
        self.postpone_all_tags = postpone;
        self
    }
}

/// Single-slot deferred action, applied once the player leaves a
/// transitional state. A new postponement overwrites the previous one;
/// this is a deliberate simplification, not a queue.
enum PostponedTask {
    None,
    Play {
        token: Token,
        media: Media,
        properties: PlaybackProperties,
    },
    Pause(bool),
    Stop,
    Seek {
        position: i64,
        unit: PositionUnit,
    },
    SetLevel(Level),
}

struct SeekRecord {
    was_paused: bool,
    target: Option<i64>,
    unit: PositionUnit,
}

/// Narrow gate between the stream-output end-of-stream hook (engine
/// delivery thread) and the loop thread. The hook takes only this lock,
/// never the primary one.
struct PromotionGate {
    eos_seen: Mutex<bool>,
}

impl PromotionGate {
    fn new() -> Self {
        Self {
            eos_seen: Mutex::new(false),
        }
    }

    fn mark_eos_seen(&self) {
        *self.eos_seen.lock().unwrap() = true;
    }

    /// Returns true (and clears the flag) if an end-of-stream was observed
    /// since the last call.
    fn take_eos_seen(&self) -> bool {
        let mut seen = self.eos_seen.lock().unwrap();
        std::mem::replace(&mut *seen, false)
    }

    fn clear(&self) {
        *self.eos_seen.lock().unwrap() = false;
    }
}

enum StreamSlot {
    Current,
    Next,
}

struct PlayerInner {
    engine: Arc<dyn MediaEngine>,
    callbacks: Callbacks,
    config: PlayerConfig,
    bus_tx: BusSender,
    gate: Arc<PromotionGate>,
    retired: RetiredIds,

    state: PlaybackState,
    graph: Option<Box<dyn EngineGraph>>,
    current: Option<Stream>,
    next: Option<Stream>,

    engine_level: Level,
    pending_level: Option<Level>,

    postponed: PostponedTask,
    seek: SeekRecord,

    duration_ns: Option<i64>,
    duration_bytes: Option<i64>,
    force_duration_update: bool,
    about_to_end_sent: bool,
    periodic_updates: bool,

    postpone_set: HashSet<String>,
    aggregated_tags: TagList,
    postponed_tags: TagList,
}

struct PlayerShared {
    inner: Mutex<PlayerInner>,
    next_token: AtomicU64,
}

/// The playback coordinator. See the [module docs](self) for an overview.
pub struct Player {
    shared: Arc<PlayerShared>,
    quit_tx: Sender<()>,
    loop_thread: Option<thread::JoinHandle<()>>,
}

impl Player {
    /// Creates a player over `engine` with default configuration. Returns
    /// once the event-loop thread is confirmed running.
    pub fn new(engine: Arc<dyn MediaEngine>, callbacks: Callbacks) -> Result<Self> {
        Self::with_config(engine, callbacks, PlayerConfig::default())
    }

    pub fn with_config(
        engine: Arc<dyn MediaEngine>,
        callbacks: Callbacks,
        config: PlayerConfig,
    ) -> Result<Self> {
        let (bus_tx, bus_rx) = unbounded();
        let (quit_tx, quit_rx) = unbounded();
        let update_interval = config.update_interval;

        let mut postpone_set = HashSet::new();
        // Bitrate tags can update very often; never report them immediately.
        postpone_set.insert(TAG_BITRATE.to_owned());
        postpone_set.insert(TAG_MINIMUM_BITRATE.to_owned());
        postpone_set.insert(TAG_MAXIMUM_BITRATE.to_owned());

        let inner = PlayerInner {
            engine,
            callbacks,
            config,
            bus_tx,
            gate: Arc::new(PromotionGate::new()),
            retired: Arc::new(Mutex::new(VecDeque::new())),
            state: PlaybackState::Idle,
            graph: None,
            current: None,
            next: None,
            engine_level: Level::Stopped,
            pending_level: None,
            postponed: PostponedTask::None,
            seek: SeekRecord {
                was_paused: false,
                target: None,
                unit: PositionUnit::Nanoseconds,
            },
            duration_ns: None,
            duration_bytes: None,
            force_duration_update: true,
            about_to_end_sent: false,
            periodic_updates: false,
            postpone_set,
            aggregated_tags: TagList::new(),
            postponed_tags: TagList::new(),
        };

        let shared = Arc::new(PlayerShared {
            inner: Mutex::new(inner),
            next_token: AtomicU64::new(0),
        });

        // The constructor only returns once the loop actually runs, so no
        // bus message can be lost between construction and dispatch.
        let started = Arc::new((Mutex::new(false), Condvar::new()));
        let loop_shared = Arc::clone(&shared);
        let loop_started = Arc::clone(&started);
        let handle = thread::Builder::new()
            .name("segue-loop".to_owned())
            .spawn(move || run_loop(loop_shared, bus_rx, quit_rx, update_interval, loop_started))
            .map_err(|err| SegueError::Engine(format!("could not spawn event loop: {err}")))?;

        let (lock, condvar) = &*started;
        let mut running = lock.lock().unwrap();
        while !*running {
            running = condvar.wait(running).unwrap();
        }
        log::debug!("player event loop confirmed running");

        Ok(Self {
            shared,
            quit_tx,
            loop_thread: Some(handle),
        })
    }

    /// Generates a unique playback token.
    pub fn new_token(&self) -> Token {
        self.shared.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Begins playback of `media`, either right now or after the current
    /// playback ends.
    ///
    /// Plays immediately when the player is idle, when `play_now` is true,
    /// or when `token` matches the current stream's token (the caller is
    /// re-submitting the unit that is already playing, e.g. to replace a
    /// queued follow-up that got promoted too early). Otherwise the media
    /// becomes the next stream, replacing any previously queued one.
    ///
    /// Returns `false` only if `media` is invalid or the graph could not be
    /// built; a postponed request still returns `true`.
    pub fn play_media(
        &self,
        token: Token,
        media: Media,
        play_now: bool,
        properties: PlaybackProperties,
    ) -> bool {
        self.lock_inner().play_media(token, media, play_now, properties)
    }

    /// Stops playback and discards current and next media. No-op when
    /// idle; postponed while transitioning.
    pub fn stop(&self) {
        self.lock_inner().stop();
    }

    /// Pauses or resumes playback. Ignored when idle, when nothing plays,
    /// when the current stream is live (or not yet known not to be), or
    /// when already at the requested level; postponed while transitioning.
    pub fn set_paused(&self, paused: bool) {
        self.lock_inner().set_paused(paused);
    }

    /// Seeks the current media. Ignored when idle, when nothing plays, or
    /// when the media is not seekable; postponed while transitioning.
    pub fn set_position(&self, position: i64, unit: PositionUnit) {
        self.lock_inner().set_position(position, unit);
    }

    pub fn state(&self) -> PlaybackState {
        self.lock_inner().state
    }

    pub fn is_transitioning(&self) -> bool {
        self.lock_inner().is_transitioning()
    }

    /// Current playback position, or `None` if it cannot be determined in
    /// the given unit.
    pub fn position(&self, unit: PositionUnit) -> Option<i64> {
        self.lock_inner().query_position(unit)
    }

    /// Current media duration, or `None` if unknown in the given unit.
    pub fn duration(&self, unit: PositionUnit) -> Option<i64> {
        let inner = self.lock_inner();
        match unit {
            PositionUnit::Nanoseconds => inner.duration_ns,
            PositionUnit::Bytes => inner.duration_bytes,
        }
    }

    /// Adds or removes a tag name from the set whose announcements are
    /// always delayed to the next periodic update.
    pub fn force_postpone_tag(&self, name: &str, postpone: bool) {
        let mut inner = self.lock_inner();
        if postpone {
            inner.postpone_set.insert(name.to_owned());
        } else {
            inner.postpone_set.remove(name);
        }
    }

    /// Overrides the current stream's buffer size limit; `None` restores
    /// the default. Does nothing without a current stream.
    pub fn set_buffer_size_limit(&self, limit: Option<u32>) {
        if let Some(current) = self.lock_inner().current.as_mut() {
            current.set_buffer_size_limit(limit);
        }
    }

    /// Overrides the duration used for bitrate-based buffer estimation.
    pub fn set_buffer_estimation_duration(&self, duration: Option<Duration>) {
        if let Some(current) = self.lock_inner().current.as_mut() {
            current.set_buffer_estimation_duration(duration);
        }
    }

    /// Overrides the current stream's buffering timeout.
    pub fn set_buffer_timeout(&self, timeout: Option<Duration>) {
        if let Some(current) = self.lock_inner().current.as_mut() {
            current.set_buffer_timeout(timeout);
        }
    }

    /// Overrides the current stream's buffering watermarks, in percent.
    pub fn set_buffer_thresholds(&self, low: Option<u32>, high: Option<u32>) {
        if let Some(current) = self.lock_inner().current.as_mut() {
            current.set_buffer_thresholds(low, high);
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, PlayerInner> {
        self.shared.inner.lock().unwrap()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Cancel any transition and stop playback immediately, then take
        // the loop down.
        self.lock_inner().shutdown_graph(true);
        let _ = self.quit_tx.send(());
        if let Some(handle) = self.loop_thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(
    shared: Arc<PlayerShared>,
    bus_rx: Receiver<BusMessage>,
    quit_rx: Receiver<()>,
    update_interval: Duration,
    started: Arc<(Mutex<bool>, Condvar)>,
) {
    {
        let (lock, condvar) = &*started;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
    }
    log::debug!("event loop started");

    let ticker = tick(update_interval);
    loop {
        select! {
            recv(bus_rx) -> message => match message {
                Ok(message) => shared.inner.lock().unwrap().handle_bus_message(message),
                Err(_) => break,
            },
            recv(ticker) -> _ => shared.inner.lock().unwrap().handle_tick(),
            recv(quit_rx) -> _ => break,
        }
    }

    log::debug!("event loop stopped");
}

impl PlayerInner {
    fn is_transitioning(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Starting
                | PlaybackState::Stopping
                | PlaybackState::Seeking
                | PlaybackState::Buffering
        ) || self.pending_level.is_some()
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = self.state;
        self.state = new_state;
        log::trace!("state change: old: {old_state} new: {new_state}");
        if let Some(callback) = &self.callbacks.state_changed {
            callback(old_state, new_state);
        }
    }

    /// Requests an engine level change, skipping redundant requests.
    fn request_level(&mut self, level: Level) -> bool {
        if self.engine_level == level {
            return true;
        }
        let Some(graph) = self.graph.as_mut() else {
            return false;
        };
        log::debug!(
            "switching engine level from {} to {}",
            self.engine_level.name(),
            level.name()
        );
        // The pending level is tracked from the engine's level-changed
        // reports, not set here, so a request that completes in one report
        // never leaves a stale in-flight marker behind.
        match graph.request_level(level) {
            Ok(()) => true,
            Err(err) => {
                log::error!("switching engine level to {} failed: {err}", level.name());
                false
            }
        }
    }

    // -- graph lifecycle ---------------------------------------------------

    fn initialize_graph(&mut self) -> bool {
        match self.engine.create_graph(self.bus_tx.clone()) {
            Ok(graph) => {
                self.graph = Some(graph);
                self.set_state(PlaybackState::Idle);
                log::debug!("graph initialized");
                true
            }
            Err(err) => {
                log::error!("could not create playback graph: {err}");
                false
            }
        }
    }

    /// Tears down and builds the graph again. Used both for ordinary
    /// playback starts and for self-healing after engine errors.
    fn reinitialize_graph(&mut self) -> bool {
        self.shutdown_graph(false);
        self.initialize_graph()
    }

    fn shutdown_graph(&mut self, announce: bool) {
        if self.graph.is_none() {
            return;
        }
        // Destructive cancellation always wins: whatever was postponed
        // dies with the graph.
        self.postponed = PostponedTask::None;
        self.set_idle(announce);
        self.graph = None;
        log::debug!("graph shut down");
    }

    fn set_idle(&mut self, announce: bool) {
        log::trace!("setting player to idle");

        // Unblock buffering before stopping, otherwise a parked delivery
        // thread deadlocks the level change.
        if let Some(current) = self.current.as_mut() {
            current.block_buffering(false);
        }
        if let Some(next) = self.next.as_mut() {
            next.block_buffering(false);
        }

        if let Some(graph) = self.graph.as_mut() {
            // Stopping is the one synchronous level change.
            if let Err(err) = graph.request_level(Level::Stopped) {
                log::error!("could not stop graph: {err}");
            }
        }

        self.current = None;
        self.next = None;

        if announce {
            self.set_state(PlaybackState::Idle);
        } else {
            self.state = PlaybackState::Idle;
        }

        log::trace!("player is idle");
        self.reset_session_values();
    }

    fn reset_session_values(&mut self) {
        self.engine_level = Level::Stopped;
        self.pending_level = None;
        self.duration_ns = None;
        self.duration_bytes = None;
        self.about_to_end_sent = false;
        self.force_duration_update = true;
        self.periodic_updates = false;
        self.gate.clear();
        self.aggregated_tags = TagList::new();
        self.postponed_tags = TagList::new();
        self.seek.target = None;
    }

    fn setup_stream(
        &mut self,
        token: Token,
        media: Media,
        properties: PlaybackProperties,
    ) -> Result<Stream> {
        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| SegueError::Engine("no playback graph".to_owned()))?;

        let settings = SourceSettings {
            jitter_buffer_length: properties
                .jitter_buffer_length
                .unwrap_or(JITTER_BUFFER_LENGTH_DEFAULT),
            allow_retransmission: properties.allow_retransmission.unwrap_or(true),
            allowed_transports: properties.allowed_transports.unwrap_or_default(),
        };
        let mut node = graph.add_source(media.uri(), &settings)?;

        // The hook runs on the engine's delivery thread: it only raises the
        // flag and posts a wake-up, the actual promotion happens on the
        // loop thread.
        let gate = Arc::clone(&self.gate);
        let bus = self.bus_tx.clone();
        node.set_eos_hook(Box::new(move || {
            log::debug!("end-of-stream observed at stream output");
            gate.mark_eos_seen();
            let _ = bus.send(BusMessage::Application(AppEvent::StreamEosObserved));
        }));

        Ok(Stream::new(
            node,
            token,
            media,
            properties,
            Arc::clone(&self.retired),
        ))
    }

    /// If the audible stream ended, promote next to current. Runs at the
    /// start of every bus/timer dispatch.
    fn promote_next_if_eos(&mut self) {
        if !self.gate.take_eos_seen() {
            return;
        }
        // The mix point is feeding from the next stream already; make the
        // bookkeeping match. The old current stream tears down here.
        log::debug!("promoting next stream to current after end-of-stream");
        let old = self.current.take();
        self.current = self.next.take();
        drop(old);
    }

    // -- public operation bodies ------------------------------------------

    fn play_media(
        &mut self,
        token: Token,
        media: Media,
        play_now: bool,
        properties: PlaybackProperties,
    ) -> bool {
        let matches_current = self
            .current
            .as_ref()
            .is_some_and(|current| current.token() == token);

        if self.state == PlaybackState::Idle || play_now || matches_current {
            if !media.is_valid() {
                log::error!("cannot play invalid media");
                return false;
            }

            log::debug!(
                "playing media with URI {} now with token {token}",
                media.uri()
            );

            if self.is_transitioning() {
                log::debug!("player currently transitioning; postponing play request");
                self.postponed = PostponedTask::Play {
                    token,
                    media,
                    properties,
                };
                return true;
            }

            // Clear out any leftover graph from the previous session.
            if !self.reinitialize_graph() {
                log::error!("(re)initializing graph failed; aborting play attempt");
                return false;
            }

            self.next = None;
            self.set_state(PlaybackState::Starting);

            match self.setup_stream(token, media, properties) {
                Ok(stream) => self.current = Some(stream),
                Err(err) => {
                    log::error!("could not create stream: {err}");
                    self.reinitialize_graph();
                    return false;
                }
            }

            // The loop continues the state changes towards playing once the
            // paused level is reached.
            if !self.request_level(Level::Paused) {
                // A failed level change leaves the graph in an undefined
                // state; rebuild rather than retrying the same media.
                log::error!("could not switch engine to paused level; reinitializing graph");
                self.reinitialize_graph();
                return false;
            }

            true
        } else {
            log::debug!(
                "queuing media with URI {} as next media with token {token}",
                media.uri()
            );

            // Any previously queued next media is replaced.
            self.next = None;

            if !media.is_valid() {
                log::error!("cannot schedule invalid media as next one");
                return false;
            }

            match self.setup_stream(token, media, properties) {
                Ok(mut stream) => {
                    // A next stream may buffer for as long as it likes; it
                    // is not audible yet. The timeout comes back at
                    // promotion.
                    stream.enable_buffering_timeout(false);
                    self.next = Some(stream);
                    true
                }
                Err(err) => {
                    log::error!("could not create next stream: {err}");
                    false
                }
            }
        }
    }

    fn stop(&mut self) {
        if self.graph.is_none()
            || matches!(self.state, PlaybackState::Stopping | PlaybackState::Idle)
        {
            return;
        }

        if self.is_transitioning() {
            log::debug!("player currently transitioning; postponing stop");
            self.postponed = PostponedTask::Stop;
        } else {
            self.shutdown_graph(true);
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if self.graph.is_none() || self.state == PlaybackState::Idle {
            return;
        }
        if paused && self.engine_level == Level::Paused {
            return;
        }
        if !paused && self.pending_level == Some(Level::Playing) {
            return;
        }
        let Some(current) = self.current.as_ref() else {
            return;
        };
        if current.is_live() {
            // Live media cannot pause.
            log::info!("current stream is live, cannot pause");
            return;
        }
        if !current.is_live_known() {
            // Unknown counts as live, in case it later turns out to be.
            log::info!("current stream's live status is not known yet, cannot pause");
            return;
        }

        if self.is_transitioning() {
            log::info!("player currently transitioning; postponing pause task");
            self.postponed = PostponedTask::Pause(paused);
            return;
        }

        self.request_level(if paused { Level::Paused } else { Level::Playing });
    }

    fn set_position(&mut self, position: i64, unit: PositionUnit) {
        if self.graph.is_none() || self.state == PlaybackState::Idle {
            return;
        }
        let Some(current) = self.current.as_ref() else {
            return;
        };
        if !current.is_seekable() {
            log::info!("current stream is not seekable, cannot seek");
            return;
        }

        if self.is_transitioning() {
            log::info!("player currently transitioning; postponing seek");
            self.postponed = PostponedTask::Seek { position, unit };
            return;
        }

        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return;
        }

        log::debug!(
            "seek requested, unit {}; switching to seeking state",
            unit.description()
        );

        self.seek = SeekRecord {
            was_paused: self.state == PlaybackState::Paused,
            target: Some(position),
            unit,
        };
        self.set_state(PlaybackState::Seeking);

        if self.seek.was_paused {
            // Already paused: the seek can finish right now.
            self.finish_seek(true);
        } else {
            // Switch to paused first; the level report finishes the seek.
            self.request_level(Level::Paused);
        }
    }

    /// Performs the recorded seek. With `restore_state`, also returns the
    /// player to its pre-seek resting state; a failed seek still restores,
    /// so the player is never left stuck in seeking.
    fn finish_seek(&mut self, restore_state: bool) -> bool {
        let Some(target) = self.seek.target.take() else {
            return false;
        };
        let unit = self.seek.unit;

        let ok = match self.graph.as_mut() {
            Some(graph) => match graph.seek(target, unit) {
                Ok(()) => true,
                Err(err) => {
                    log::error!("seeking failed: {err}");
                    false
                }
            },
            None => false,
        };

        if restore_state {
            if self.seek.was_paused {
                log::debug!("seeking finished; switching back to paused state");
                self.set_state(PlaybackState::Paused);
                self.run_postponed_task();
            } else if self
                .current
                .as_ref()
                .is_some_and(|current| current.performs_buffering())
            {
                // The seek flushed the stream buffer; going straight to
                // buffering avoids a brief burst of playback before the
                // refill pauses it again.
                log::debug!("seeking finished; switching to buffering state");
                if let Some(current) = self.current.as_mut() {
                    current.set_buffering(true);
                }
                self.set_state(PlaybackState::Buffering);
            } else {
                log::debug!("seeking finished; requesting playing level");
                self.request_level(Level::Playing);
            }
        }

        ok
    }

    fn run_postponed_task(&mut self) {
        let task = std::mem::replace(&mut self.postponed, PostponedTask::None);
        match task {
            PostponedTask::None => {}
            PostponedTask::Play {
                token,
                media,
                properties,
            } => {
                log::debug!("handling postponed play task");
                self.play_media(token, media, true, properties);
            }
            PostponedTask::Pause(paused) => {
                log::debug!("handling postponed pause task");
                self.set_paused(paused);
            }
            PostponedTask::Stop => {
                log::debug!("handling postponed stop task");
                self.stop();
            }
            PostponedTask::Seek { position, unit } => {
                log::debug!("handling postponed seek task");
                self.set_position(position, unit);
            }
            PostponedTask::SetLevel(level) => {
                log::debug!("handling postponed level change task");
                self.request_level(level);
            }
        }
    }

    // -- queries -----------------------------------------------------------

    fn query_position(&self, unit: PositionUnit) -> Option<i64> {
        if self.state == PlaybackState::Idle {
            return None;
        }
        self.graph.as_ref()?.query_position(unit)
    }

    fn query_duration_raw(&self, unit: PositionUnit) -> Option<i64> {
        if self.state == PlaybackState::Idle {
            return None;
        }
        self.graph.as_ref()?.query_duration(unit)
    }

    /// Re-queries durations in both units and notifies about changes (or
    /// unconditionally after `force_duration_update`).
    fn update_durations(&mut self) {
        let new_ns = self.query_duration_raw(PositionUnit::Nanoseconds);
        let new_bytes = self.query_duration_raw(PositionUnit::Bytes);

        let ns_updated = self.force_duration_update || new_ns != self.duration_ns;
        let bytes_updated = self.force_duration_update || new_bytes != self.duration_bytes;

        log::debug!(
            "duration updated: nanoseconds: {ns_updated}  bytes: {bytes_updated}  \
             current: {new_ns:?} ns / {new_bytes:?} bytes"
        );

        if let Some(current) = self.current.as_ref() {
            if let Some(callback) = &self.callbacks.duration_updated {
                if ns_updated {
                    self.duration_ns = new_ns;
                    callback(
                        current.media(),
                        current.token(),
                        new_ns,
                        PositionUnit::Nanoseconds,
                    );
                }
                if bytes_updated {
                    self.duration_bytes = new_bytes;
                    callback(
                        current.media(),
                        current.token(),
                        new_bytes,
                        PositionUnit::Bytes,
                    );
                }
            }
        }

        self.force_duration_update = false;
    }

    /// Applies the watermark outcome of the current stream's buffering
    /// flag. Live streams (and streams of unknown liveness) never pause
    /// playback for buffering.
    fn recheck_buffering_state(&mut self) {
        let Some(current) = self.current.as_ref() else {
            return;
        };

        if current.is_buffering()
            && !current.is_live()
            && current.is_live_known()
            && self.state == PlaybackState::Playing
        {
            log::debug!(
                "current stream's buffering flag enabled; switching to paused level and \
                 setting state to buffering"
            );
            self.set_state(PlaybackState::Buffering);
            self.request_level(Level::Paused);
        } else if !current.is_buffering() && self.state == PlaybackState::Buffering {
            log::debug!("current stream's buffering flag disabled; switching back to playing");
            self.request_level(Level::Playing);
        }
    }

    // -- bus dispatch ------------------------------------------------------

    fn handle_bus_message(&mut self, message: BusMessage) {
        // Keep current/next in sync with the mix point before anything
        // else looks at them.
        self.promote_next_if_eos();

        match message {
            BusMessage::Application(AppEvent::StreamEosObserved) => {
                log::trace!("received wake-up from stream end-of-stream hook");
            }
            BusMessage::Application(AppEvent::SourceOutputReady { origin }) => {
                self.handle_source_output_ready(origin);
            }
            BusMessage::StreamStart => self.handle_stream_start(),
            BusMessage::EndOfStream => self.handle_end_of_stream(),
            BusMessage::LevelChanged { old, new, pending } => {
                self.handle_level_changed(old, new, pending);
            }
            BusMessage::Tags { origin, tags } => self.handle_tags(origin, tags),
            BusMessage::Buffering { origin, percent } => self.handle_buffering(origin, percent),
            BusMessage::DurationChanged { origin } => {
                let from_mix_point = self
                    .graph
                    .as_ref()
                    .is_some_and(|graph| origin == Some(graph.mix_point_id()));
                if from_mix_point {
                    // The mix point reports the next unit's duration just
                    // before the switch; showing it early is wrong.
                    log::trace!("ignoring duration change reported by the mix point");
                } else {
                    log::debug!("duration update reported");
                    self.update_durations();
                }
            }
            BusMessage::Latency => {
                log::debug!("recalculating latency");
                if let Some(graph) = self.graph.as_mut() {
                    graph.recalculate_latency();
                }
            }
            BusMessage::RequestLevel(level) => {
                log::debug!("level change to {} requested by the engine", level.name());
                if self.is_transitioning() {
                    log::debug!("postponing requested level change; player is transitioning");
                    self.postponed = PostponedTask::SetLevel(level);
                } else {
                    self.request_level(level);
                }
            }
            BusMessage::Info { message, .. } => {
                log::info!("engine: {message}");
                if let Some(callback) = &self.callbacks.info {
                    callback(&message);
                }
            }
            BusMessage::Warning { message, .. } => {
                log::warn!("engine: {message}");
                if let Some(callback) = &self.callbacks.warning {
                    callback(&message);
                }
            }
            BusMessage::Error { origin, message } => self.handle_error(origin, message),
        }
    }

    fn handle_source_output_ready(&mut self, origin: ObjectId) {
        let slot = if self
            .current
            .as_ref()
            .is_some_and(|stream| stream.contains(origin))
        {
            StreamSlot::Current
        } else if self
            .next
            .as_ref()
            .is_some_and(|stream| stream.contains(origin))
        {
            StreamSlot::Next
        } else {
            return;
        };

        let is_current = matches!(slot, StreamSlot::Current);
        let (facts, media, token) = {
            let stream = match slot {
                StreamSlot::Current => self.current.as_mut(),
                StreamSlot::Next => self.next.as_mut(),
            };
            let Some(stream) = stream else { return };
            let facts = stream.refresh_output_facts();
            (facts, stream.media().clone(), stream.token())
        };

        self.notify_output_facts(&media, token, is_current, facts);
    }

    fn notify_output_facts(&self, media: &Media, token: Token, is_current: bool, facts: OutputFacts) {
        if let Some(seekable) = facts.seekable {
            if let Some(callback) = &self.callbacks.is_seekable {
                callback(media, token, is_current, seekable);
            }
        }
        if let Some(live) = facts.live {
            if let Some(callback) = &self.callbacks.is_live {
                callback(media, token, is_current, live);
            }
        }
    }

    fn handle_stream_start(&mut self) {
        log::debug!("stream start reported");

        // Fresh media: re-arm the about-to-end notification and drop tag
        // state belonging to the previous stream.
        self.about_to_end_sent = false;
        self.aggregated_tags = TagList::new();
        self.postponed_tags = TagList::new();

        if self.current.is_none() {
            // Should not happen; rebuild to get back to a defined state.
            log::error!("stream start received, but no current media present");
            self.reinitialize_graph();
            return;
        }

        // Some media only report a usable duration from here on; force a
        // notification in case no further duration updates ever happen.
        self.force_duration_update = true;
        self.update_durations();

        let (media, token) = {
            let Some(current) = self.current.as_ref() else {
                return;
            };
            (current.media().clone(), current.token())
        };
        log::debug!("media with URI {} started to play", media.uri());
        if let Some(callback) = &self.callbacks.media_started {
            callback(&media, token);
        }

        let newly_known_live = {
            let Some(current) = self.current.as_mut() else {
                return;
            };
            let live = if current.is_live_known() {
                None
            } else {
                current.recheck_live()
            };
            // This stream is audible now: buffering may not stall forever
            // anymore, and its delivery must not stay starved.
            current.enable_buffering_timeout(true);
            current.block_buffering(false);
            live
        };
        if let Some(live) = newly_known_live {
            if let Some(callback) = &self.callbacks.is_live {
                callback(&media, token, true, live);
            }
        }

        // The promoted stream may have been mid-buffering while it was the
        // next stream; pick that condition up.
        self.recheck_buffering_state();
    }

    fn handle_end_of_stream(&mut self) {
        log::debug!("end-of-stream reported");

        let next_request = self
            .next
            .as_ref()
            .filter(|next| next.media().is_valid())
            .map(|next| (next.token(), next.media().clone(), next.properties().clone()));

        if let Some((token, media, properties)) = next_request {
            // A next media queued too late for the gapless switch; play it
            // now. Its stream start will announce it.
            log::info!("there is next media to play with URI {}", media.uri());
            self.play_media(token, media, true, properties);
        } else {
            self.stop();
            if let Some(callback) = &self.callbacks.end_of_stream {
                callback();
            }
        }
    }

    fn handle_level_changed(&mut self, old: Level, new: Level, pending: Option<Level>) {
        log::trace!(
            "engine level change: old: {} new: {} pending: {:?}",
            old.name(),
            new.name(),
            pending.map(|level| level.name())
        );

        self.engine_level = new;
        self.pending_level = pending;

        match (self.state, new) {
            (PlaybackState::Starting, Level::Paused) => {
                // Preroll reached. Some media need a duration re-query here.
                self.update_durations();

                let Some(properties) = self
                    .current
                    .as_ref()
                    .map(|current| current.properties().clone())
                else {
                    return;
                };

                let seekable = self
                    .current
                    .as_ref()
                    .is_some_and(|current| current.is_seekable());
                if properties.start_at > 0 && seekable {
                    // An initial position was requested; run the seek
                    // without a state switch and continue as a plain
                    // preroll, since the engine stays at the paused level.
                    self.seek = SeekRecord {
                        was_paused: properties.start_paused,
                        target: Some(properties.start_at),
                        unit: properties.start_at_unit.unwrap_or(PositionUnit::Nanoseconds),
                    };
                    self.set_state(PlaybackState::Seeking);
                    self.finish_seek(false);
                }

                if properties.start_paused {
                    log::debug!("preroll reached and the current stream starts paused");
                    self.set_state(PlaybackState::Paused);
                    self.run_postponed_task();
                } else {
                    let needs_buffering = self.current.as_ref().is_some_and(|current| {
                        !current.is_live() && current.is_buffering()
                    });
                    if needs_buffering {
                        log::debug!(
                            "current stream is still buffering during startup; switching to \
                             buffering state"
                        );
                        self.set_state(PlaybackState::Buffering);
                    } else {
                        log::debug!(
                            "current stream fully buffered or does not need buffering; \
                             requesting playing level"
                        );
                        self.request_level(Level::Playing);
                    }
                }
            }
            (PlaybackState::Starting, Level::Playing) => {
                self.set_state(PlaybackState::Playing);
                self.run_postponed_task();
            }
            (PlaybackState::Seeking, Level::Paused) => {
                if old != Level::Paused && self.seek.target.is_some() {
                    log::debug!("paused level reached; finishing seek");
                    self.finish_seek(true);
                }
            }
            (PlaybackState::Seeking, Level::Playing) => {
                log::debug!("seek finished and playing level restored");
                self.set_state(PlaybackState::Playing);
                self.run_postponed_task();
            }
            (PlaybackState::Buffering, Level::Paused) => {
                // Buffering can finish before the switch to paused does;
                // resume right away in that case.
                let done = self
                    .current
                    .as_ref()
                    .is_some_and(|current| !current.is_buffering());
                if done {
                    self.request_level(Level::Playing);
                }
            }
            (PlaybackState::Buffering, Level::Playing) => {
                log::debug!("reached playing level after buffering finished");
                self.set_state(PlaybackState::Playing);
                self.run_postponed_task();
            }
            (PlaybackState::Playing | PlaybackState::Paused, Level::Paused) => {
                if self.state != PlaybackState::Paused {
                    self.set_state(PlaybackState::Paused);
                    self.run_postponed_task();
                }
            }
            (PlaybackState::Playing | PlaybackState::Paused, Level::Playing) => {
                if self.state != PlaybackState::Playing {
                    self.set_state(PlaybackState::Playing);
                    self.run_postponed_task();
                }
            }
            _ => {}
        }

        // Periodic updates only make sense while playing.
        self.periodic_updates = self.state == PlaybackState::Playing;
    }

    fn handle_tags(&mut self, origin: ObjectId, tags: TagList) {
        // A bitrate makes the duration-based buffer size estimation
        // possible; note it on whichever stream announced it.
        let bitrate = tags
            .first(TAG_BITRATE)
            .and_then(TagValue::as_uint)
            .map(|bitrate| bitrate.min(u32::MAX as u64) as u32);
        if let Some(bitrate) = bitrate {
            if let Some(current) = self
                .current
                .as_mut()
                .filter(|stream| stream.contains(origin))
            {
                current.note_bitrate(bitrate);
            } else if let Some(next) =
                self.next.as_mut().filter(|stream| stream.contains(origin))
            {
                next.note_bitrate(bitrate);
            }
        }

        if self.callbacks.new_tags.is_none() {
            return;
        }
        // Only the current stream's announcements are delivered; a
        // preloading next stream's metadata would otherwise be mislabeled
        // with the current media.
        if !self
            .current
            .as_ref()
            .is_some_and(|current| current.contains(origin))
        {
            return;
        }

        let delta = tags.delta_against(&self.aggregated_tags);
        if delta.is_empty() {
            return;
        }
        log::debug!("new tags reported: {delta}");
        self.aggregated_tags.merge_replacing(&delta);

        if self.config.postpone_all_tags {
            self.postponed_tags.merge_replacing(&delta);
            return;
        }

        let mut immediate = delta;
        let postponed_names: Vec<String> = immediate
            .names()
            .filter(|name| self.postpone_set.contains(*name))
            .map(str::to_owned)
            .collect();
        for name in &postponed_names {
            if let Some(values) = immediate.remove(name) {
                // Stale pending values for this tag are replaced wholesale.
                self.postponed_tags.replace(name.clone(), values);
            }
        }

        if !immediate.is_empty() {
            if let Some(current) = self.current.as_ref() {
                if let Some(callback) = &self.callbacks.new_tags {
                    callback(current.media(), current.token(), immediate);
                }
            }
        }
    }

    fn handle_buffering(&mut self, origin: ObjectId, percent: u32) {
        log::debug!("buffering reported at {percent}%");

        let slot = if self
            .current
            .as_ref()
            .is_some_and(|stream| stream.contains(origin))
        {
            StreamSlot::Current
        } else if self
            .next
            .as_ref()
            .is_some_and(|stream| stream.contains(origin))
        {
            StreamSlot::Next
        } else {
            return;
        };
        let is_current = matches!(slot, StreamSlot::Current);
        let label = if is_current { "current" } else { "next" };

        // Low/high watermark behavior: below 100% starts a buffering
        // condition, reaching 100% ends it. Repeated reports at the same
        // side never toggle the flag twice.
        let mut changed = false;
        {
            let stream = match slot {
                StreamSlot::Current => self.current.as_mut(),
                StreamSlot::Next => self.next.as_mut(),
            };
            let Some(stream) = stream else { return };

            if percent < 100 {
                if !stream.is_buffering() {
                    log::debug!(
                        "{label} stream's buffer fill level is too low; enabling buffering flag"
                    );
                    stream.set_buffering(true);
                    changed = true;
                } else if is_current
                    && !matches!(
                        self.state,
                        PlaybackState::Buffering | PlaybackState::Starting
                    )
                {
                    // Seen when seeking flushes a network stream's buffer:
                    // the flag is already set but the player is not in a
                    // state that reflects it. Force the recheck below.
                    log::debug!(
                        "{label} stream is buffering but the player is in state {}; \
                         forcing a recheck",
                        self.state
                    );
                    changed = true;
                }
            } else if stream.is_buffering() {
                log::debug!(
                    "{label} stream's buffer fill level is enough; disabling buffering flag"
                );
                stream.set_buffering(false);
                changed = true;
            }
        }

        if is_current && changed {
            let current_buffering = self
                .current
                .as_ref()
                .is_some_and(|current| current.is_buffering());
            if let Some(next) = self.next.as_mut() {
                // All delivery bandwidth goes to the audible stream while
                // it refills.
                if current_buffering {
                    log::debug!("current stream needs to buffer; blocking the next stream");
                } else {
                    log::debug!("current stream done buffering; unblocking the next stream");
                }
                next.block_buffering(current_buffering);
            }
            self.recheck_buffering_state();
        }

        if let Some(callback) = &self.callbacks.buffering_updated {
            let stream = if is_current {
                self.current.as_ref()
            } else {
                self.next.as_ref()
            };
            if let Some(stream) = stream {
                callback(
                    stream.media(),
                    stream.token(),
                    is_current,
                    percent,
                    stream.fill_level_bytes(),
                    stream.effective_buffer_size_limit(),
                );
            }
        }
    }

    fn handle_error(&mut self, origin: Option<ObjectId>, message: String) {
        if let Some(origin) = origin {
            if is_retired(&self.retired, origin) {
                // Streams being replaced produce error noise on the way
                // down; a rebuild storm over those would be spurious.
                log::debug!("dropping error message from a stream that is being shut down");
                return;
            }
        }

        log::error!("engine: {message}");
        if let Some(callback) = &self.callbacks.error {
            callback(&message);
        }

        // Engine errors are not recoverable; tear everything down and
        // rebuild so the player is usable again. The failed media is not
        // retried.
        self.reinitialize_graph();
    }

    // -- periodic updates --------------------------------------------------

    fn handle_tick(&mut self) {
        self.promote_next_if_eos();

        if !self.periodic_updates {
            return;
        }

        self.flush_postponed_tags();

        if self.state != PlaybackState::Playing || self.current.is_none() {
            return;
        }

        if let Some(callback) = &self.callbacks.buffer_level {
            if let Some(current) = self.current.as_ref() {
                if let Some(level) = current.fill_level_bytes() {
                    callback(
                        current.media(),
                        current.token(),
                        level,
                        current.effective_buffer_size_limit(),
                    );
                }
            }
        }

        if self.callbacks.position_updated.is_none()
            && self.callbacks.media_about_to_end.is_none()
        {
            return;
        }

        match self.query_position(PositionUnit::Nanoseconds) {
            Some(position) => {
                if let Some(current) = self.current.as_ref() {
                    if let Some(callback) = &self.callbacks.position_updated {
                        callback(
                            current.media(),
                            current.token(),
                            position,
                            PositionUnit::Nanoseconds,
                        );
                    }
                }

                let threshold = self.config.about_to_end_threshold.as_nanos() as i64;
                let near_end = self
                    .duration_ns
                    .is_some_and(|duration| duration - position < threshold);
                if near_end && !self.about_to_end_sent && self.callbacks.media_about_to_end.is_some()
                {
                    // Latched so the notification fires once per media.
                    self.about_to_end_sent = true;
                    if let Some(current) = self.current.as_ref() {
                        if let Some(callback) = &self.callbacks.media_about_to_end {
                            callback(current.media(), current.token());
                        }
                    }
                }
            }
            None => log::info!("could not query position"),
        }
    }

    fn flush_postponed_tags(&mut self) {
        if self.postponed_tags.is_empty() {
            return;
        }
        let tags = std::mem::take(&mut self.postponed_tags);
        // Delivered if possible, dropped otherwise; either way the buffer
        // must not accumulate.
        if let Some(current) = self.current.as_ref() {
            if let Some(callback) = &self.callbacks.new_tags {
                callback(current.media(), current.token(), tags);
            }
        }
    }
}
