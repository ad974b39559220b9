//! Deterministic scripted engine.
//!
//! Used by the test suites to drive a real [`Player`](crate::Player)
//! without devices or decoders: level changes post their full message
//! chains immediately, and a shared [`MockControl`] handle scripts
//! everything else (buffering reports, tags, errors, end-of-stream,
//! probe answers) and records what the player did to each source.

use crate::engine::{
    AppEvent, BufferLimits, BusMessage, BusSender, EngineGraph, EosHook, Level, MediaEngine,
    ObjectId, SourceNode, SourceSettings,
};
use crate::error::{Result, SegueError};
use crate::properties::PositionUnit;
use crate::tags::TagList;
use std::sync::{Arc, Mutex};

/// Snapshot of a mock source's recorded state, for test assertions.
#[derive(Debug, Clone)]
pub struct MockSourceInfo {
    pub uri: String,
    pub blocked: bool,
    pub shutting_down: bool,
    pub level_locked: bool,
    pub stopped: bool,
    pub detached: bool,
    pub removed: bool,
    pub ended: bool,
    pub limits: Option<BufferLimits>,
}

struct MockSource {
    id: ObjectId,
    uri: String,
    seekable: Option<bool>,
    live: Option<bool>,
    eos_hook: Option<Arc<dyn Fn() + Send + Sync>>,
    limits: Option<BufferLimits>,
    fill_level: Option<u64>,
    blocked: bool,
    shutting_down: bool,
    level_locked: bool,
    stopped: bool,
    detached: bool,
    removed: bool,
    ended: bool,
}

impl MockSource {
    fn is_attached(&self) -> bool {
        !self.ended && !self.removed && !self.detached
    }

    fn info(&self) -> MockSourceInfo {
        MockSourceInfo {
            uri: self.uri.clone(),
            blocked: self.blocked,
            shutting_down: self.shutting_down,
            level_locked: self.level_locked,
            stopped: self.stopped,
            detached: self.detached,
            removed: self.removed,
            ended: self.ended,
            limits: self.limits,
        }
    }
}

struct CtlState {
    bus: Option<BusSender>,
    mix_id: ObjectId,
    level: Level,
    manual_levels: bool,
    pending_target: Option<Level>,
    stream_started: bool,
    position: Option<i64>,
    duration_ns: Option<i64>,
    duration_bytes: Option<i64>,
    fail_next_seek: bool,
    last_seek: Option<(i64, PositionUnit)>,
    latency_recalculations: u32,
    default_seekable: Option<bool>,
    default_live: Option<bool>,
    sources_buffer: bool,
    announce_ready: bool,
    sources: Vec<MockSource>,
}

fn post(state: &CtlState, message: BusMessage) {
    if let Some(bus) = &state.bus {
        let _ = bus.send(message);
    }
}

const LEVEL_ORDER: [Level; 4] = [Level::Stopped, Level::Ready, Level::Paused, Level::Playing];

fn level_index(level: Level) -> usize {
    LEVEL_ORDER
        .iter()
        .position(|candidate| *candidate == level)
        .unwrap_or(0)
}

impl CtlState {
    /// Posts the full chain of level-change messages from the current
    /// level to `target`, stepping one level at a time. Downward changes
    /// to stopped are silent, per the graph contract.
    fn run_level_chain(&mut self, target: Level) {
        if target == Level::Stopped {
            self.level = Level::Stopped;
            self.stream_started = false;
            return;
        }

        let mut index = level_index(self.level);
        let target_index = level_index(target);

        while index != target_index {
            let old = LEVEL_ORDER[index];
            index = if index < target_index {
                index + 1
            } else {
                index - 1
            };
            let new = LEVEL_ORDER[index];
            self.level = new;
            let pending = if index == target_index {
                None
            } else {
                Some(target)
            };
            post(self, BusMessage::LevelChanged { old, new, pending });

            // Preroll completion is where a fresh unit announces itself.
            if new == Level::Paused
                && old == Level::Ready
                && !self.stream_started
                && self.sources.iter().any(MockSource::is_attached)
            {
                self.stream_started = true;
                post(self, BusMessage::StreamStart);
            }
        }
    }
}

/// Cloneable control handle scripting a [`MockEngine`]'s behavior.
#[derive(Clone)]
pub struct MockControl {
    shared: Arc<Mutex<CtlState>>,
}

impl MockControl {
    fn lock(&self) -> std::sync::MutexGuard<'_, CtlState> {
        self.shared.lock().unwrap()
    }

    /// With manual levels, `request_level` records the target and posts
    /// nothing until [`complete_level_change`](Self::complete_level_change)
    /// runs. Lets tests hold the player in a transitional state.
    pub fn set_manual_levels(&self, manual: bool) {
        self.lock().manual_levels = manual;
    }

    /// Runs the level chain recorded while manual levels were on.
    pub fn complete_level_change(&self) {
        let mut state = self.lock();
        if let Some(target) = state.pending_target.take() {
            state.run_level_chain(target);
        }
    }

    /// Probe answer handed to sources created afterwards. Defaults to
    /// `Some(false)`: a plain non-live source.
    pub fn set_default_live(&self, live: Option<bool>) {
        self.lock().default_live = live;
    }

    /// Probe answer handed to sources created afterwards. Defaults to
    /// `Some(true)`.
    pub fn set_default_seekable(&self, seekable: Option<bool>) {
        self.lock().default_seekable = seekable;
    }

    /// Whether sources report a stream buffer, like network sources do.
    /// Defaults to false (file-like sources).
    pub fn set_sources_buffer(&self, buffer: bool) {
        self.lock().sources_buffer = buffer;
    }

    pub fn set_duration(&self, nanoseconds: Option<i64>, bytes: Option<i64>) {
        let mut state = self.lock();
        state.duration_ns = nanoseconds;
        state.duration_bytes = bytes;
    }

    pub fn set_position(&self, position: Option<i64>) {
        self.lock().position = position;
    }

    pub fn fail_next_seek(&self) {
        self.lock().fail_next_seek = true;
    }

    pub fn last_seek(&self) -> Option<(i64, PositionUnit)> {
        self.lock().last_seek
    }

    pub fn latency_recalculations(&self) -> u32 {
        self.lock().latency_recalculations
    }

    /// Id of the audible (first attached) source.
    pub fn current_source_id(&self) -> Option<ObjectId> {
        self.lock()
            .sources
            .iter()
            .find(|source| source.is_attached())
            .map(|source| source.id)
    }

    /// Id of the source queued behind the audible one.
    pub fn next_source_id(&self) -> Option<ObjectId> {
        self.lock()
            .sources
            .iter()
            .filter(|source| source.is_attached())
            .nth(1)
            .map(|source| source.id)
    }

    pub fn source_info(&self, origin: ObjectId) -> Option<MockSourceInfo> {
        self.lock()
            .sources
            .iter()
            .find(|source| source.id == origin)
            .map(MockSource::info)
    }

    /// Resolves the audible source's liveness and re-announces its output
    /// so the player picks the answer up.
    pub fn resolve_current_live(&self, live: bool) {
        let mut state = self.lock();
        let Some(source) = state.sources.iter_mut().find(|source| source.is_attached()) else {
            return;
        };
        source.live = Some(live);
        let origin = source.id;
        post(
            &state,
            BusMessage::Application(AppEvent::SourceOutputReady { origin }),
        );
    }

    pub fn set_source_fill_level(&self, origin: ObjectId, fill: Option<u64>) {
        if let Some(source) = self
            .lock()
            .sources
            .iter_mut()
            .find(|source| source.id == origin)
        {
            source.fill_level = fill;
        }
    }

    pub fn post_buffering(&self, origin: ObjectId, percent: u32) {
        let state = self.lock();
        post(&state, BusMessage::Buffering { origin, percent });
    }

    pub fn post_tags(&self, origin: ObjectId, tags: TagList) {
        let state = self.lock();
        post(&state, BusMessage::Tags { origin, tags });
    }

    pub fn post_info(&self, message: &str) {
        let state = self.lock();
        post(
            &state,
            BusMessage::Info {
                origin: None,
                message: message.to_owned(),
            },
        );
    }

    pub fn post_warning(&self, message: &str) {
        let state = self.lock();
        post(
            &state,
            BusMessage::Warning {
                origin: None,
                message: message.to_owned(),
            },
        );
    }

    pub fn post_error(&self, origin: Option<ObjectId>, message: &str) {
        let state = self.lock();
        post(
            &state,
            BusMessage::Error {
                origin,
                message: message.to_owned(),
            },
        );
    }

    pub fn post_duration_changed(&self, from_mix_point: bool) {
        let state = self.lock();
        let origin = if from_mix_point {
            Some(state.mix_id)
        } else {
            None
        };
        post(&state, BusMessage::DurationChanged { origin });
    }

    pub fn post_latency(&self) {
        let state = self.lock();
        post(&state, BusMessage::Latency);
    }

    pub fn post_request_level(&self, level: Level) {
        let state = self.lock();
        post(&state, BusMessage::RequestLevel(level));
    }

    /// The audible source reaches its end: its end-of-stream hook fires on
    /// this thread (standing in for the delivery thread), then either the
    /// follow-up source announces itself or the graph reports
    /// end-of-stream.
    pub fn reach_end_of_current(&self) {
        let hook = {
            let mut state = self.lock();
            let Some(source) = state.sources.iter_mut().find(|source| source.is_attached())
            else {
                return;
            };
            source.ended = true;
            source.eos_hook.clone()
        };

        if let Some(hook) = hook {
            hook();
        }

        let state = self.lock();
        if state.sources.iter().any(MockSource::is_attached) {
            post(&state, BusMessage::StreamStart);
        } else {
            post(&state, BusMessage::EndOfStream);
        }
    }
}

/// A scripted media engine for tests. See the [module docs](self).
pub struct MockEngine {
    control: MockControl,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            control: MockControl {
                shared: Arc::new(Mutex::new(CtlState {
                    bus: None,
                    mix_id: ObjectId::new_v4(),
                    level: Level::Stopped,
                    manual_levels: false,
                    pending_target: None,
                    stream_started: false,
                    position: None,
                    duration_ns: None,
                    duration_bytes: None,
                    fail_next_seek: false,
                    last_seek: None,
                    latency_recalculations: 0,
                    default_seekable: Some(true),
                    default_live: Some(false),
                    sources_buffer: false,
                    announce_ready: true,
                    sources: Vec::new(),
                })),
            },
        }
    }

    pub fn control(&self) -> MockControl {
        self.control.clone()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for MockEngine {
    fn create_graph(&self, bus: BusSender) -> Result<Box<dyn EngineGraph>> {
        let mut state = self.control.lock();
        state.bus = Some(bus);
        state.mix_id = ObjectId::new_v4();
        state.level = Level::Stopped;
        state.pending_target = None;
        state.stream_started = false;
        state.sources.clear();
        Ok(Box::new(MockGraph {
            control: self.control.clone(),
        }))
    }
}

struct MockGraph {
    control: MockControl,
}

impl EngineGraph for MockGraph {
    fn add_source(&mut self, uri: &str, _settings: &SourceSettings) -> Result<Box<dyn SourceNode>> {
        let mut state = self.control.lock();
        let id = ObjectId::new_v4();
        let source = MockSource {
            id,
            uri: uri.to_owned(),
            seekable: state.default_seekable,
            live: state.default_live,
            eos_hook: None,
            limits: None,
            fill_level: None,
            blocked: false,
            shutting_down: false,
            level_locked: false,
            stopped: false,
            detached: false,
            removed: false,
            ended: false,
        };
        state.sources.push(source);
        if state.announce_ready {
            post(
                &state,
                BusMessage::Application(AppEvent::SourceOutputReady { origin: id }),
            );
        }
        Ok(Box::new(MockNode {
            control: self.control.clone(),
            id,
        }))
    }

    fn request_level(&mut self, level: Level) -> Result<()> {
        let mut state = self.control.lock();
        if state.manual_levels && level != Level::Stopped {
            state.pending_target = Some(level);
        } else {
            state.run_level_chain(level);
        }
        Ok(())
    }

    fn query_position(&self, unit: PositionUnit) -> Option<i64> {
        match unit {
            PositionUnit::Nanoseconds => self.control.lock().position,
            PositionUnit::Bytes => None,
        }
    }

    fn query_duration(&self, unit: PositionUnit) -> Option<i64> {
        let state = self.control.lock();
        match unit {
            PositionUnit::Nanoseconds => state.duration_ns,
            PositionUnit::Bytes => state.duration_bytes,
        }
    }

    fn seek(&mut self, position: i64, unit: PositionUnit) -> Result<()> {
        let mut state = self.control.lock();
        if state.fail_next_seek {
            state.fail_next_seek = false;
            return Err(SegueError::Seek("scripted seek failure".to_owned()));
        }
        state.last_seek = Some((position, unit));
        if unit == PositionUnit::Nanoseconds {
            state.position = Some(position);
        }
        Ok(())
    }

    fn recalculate_latency(&mut self) {
        self.control.lock().latency_recalculations += 1;
    }

    fn mix_point_id(&self) -> ObjectId {
        self.control.lock().mix_id
    }
}

struct MockNode {
    control: MockControl,
    id: ObjectId,
}

impl MockNode {
    fn with_source<R>(&self, f: impl FnOnce(&mut MockSource) -> R) -> Option<R> {
        let mut state = self.control.lock();
        state
            .sources
            .iter_mut()
            .find(|source| source.id == self.id)
            .map(f)
    }
}

impl SourceNode for MockNode {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_eos_hook(&mut self, hook: EosHook) {
        self.with_source(|source| source.eos_hook = Some(Arc::from(hook)));
    }

    fn query_seekable(&self) -> Option<bool> {
        self.with_source(|source| source.seekable).flatten()
    }

    fn query_live(&self) -> Option<bool> {
        self.with_source(|source| source.live).flatten()
    }

    fn buffers(&self) -> bool {
        self.control.lock().sources_buffer
    }

    fn apply_buffer_limits(&self, limits: &BufferLimits) {
        let limits = *limits;
        self.with_source(|source| source.limits = Some(limits));
    }

    fn fill_level_bytes(&self) -> Option<u64> {
        self.with_source(|source| source.fill_level).flatten()
    }

    fn block_delivery(&self, block: bool) {
        self.with_source(|source| source.blocked = block);
    }

    fn mark_shutting_down(&self) {
        self.with_source(|source| source.shutting_down = true);
    }

    fn lock_level(&self, locked: bool) {
        self.with_source(|source| source.level_locked = locked);
    }

    fn force_stopped(&self) {
        self.with_source(|source| source.stopped = true);
    }

    fn detach_mix_point(&self) {
        self.with_source(|source| source.detached = true);
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.with_source(|source| source.removed = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn level_chain_posts_intermediate_steps() {
        let engine = MockEngine::new();
        let (tx, rx) = unbounded();
        let mut graph = engine.create_graph(tx).unwrap();
        let _node = graph
            .add_source("file:///a", &SourceSettings::default())
            .unwrap();
        // Drain the output-ready announcement.
        let _ = rx.try_recv();

        graph.request_level(Level::Playing).unwrap();

        let mut levels = Vec::new();
        while let Ok(message) = rx.try_recv() {
            match message {
                BusMessage::LevelChanged { new, pending, .. } => levels.push((new, pending)),
                BusMessage::StreamStart => levels.push((Level::Stopped, Some(Level::Stopped))),
                _ => {}
            }
        }
        assert_eq!(
            levels,
            vec![
                (Level::Ready, Some(Level::Playing)),
                (Level::Paused, Some(Level::Playing)),
                // StreamStart marker between preroll and playing
                (Level::Stopped, Some(Level::Stopped)),
                (Level::Playing, None),
            ]
        );
    }

    #[test]
    fn stop_requests_are_silent() {
        let engine = MockEngine::new();
        let (tx, rx) = unbounded();
        let mut graph = engine.create_graph(tx).unwrap();
        graph.request_level(Level::Stopped).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
