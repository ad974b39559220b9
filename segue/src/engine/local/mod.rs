//! Built-in local file playback engine.
//!
//! Implements the engine contract for `file://` URIs and plain paths:
//! symphonia decodes, rubato resamples to the output device rate, and a
//! render thread feeds a ring buffer consumed by the cpal output callback.
//! Each source runs its own decode worker filling a bounded sample queue;
//! the render thread drains the audible source's queue and hands the mix
//! point to the next source the moment the previous one runs dry, which is
//! what makes transitions gapless.
//!
//! File sources are never live and do not stream-buffer, so this engine
//! posts no buffering reports; the buffering protocol is driven by
//! network-capable engines (and by [`mock`](crate::engine::mock) in tests).

mod output;
mod source;

use crate::engine::{
    BusMessage, BusSender, EngineGraph, Level, MediaEngine, ObjectId, SourceNode, SourceSettings,
};
use crate::error::{Result, SegueError};
use crate::properties::PositionUnit;
use output::OutputStage;
use source::{LocalSourceNode, SourceShared};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Master volume state shared with the output callback.
pub(crate) struct VolumeControl {
    gain: Mutex<f32>,
    muted: std::sync::atomic::AtomicBool,
}

impl VolumeControl {
    fn new() -> Self {
        Self {
            gain: Mutex::new(1.0),
            muted: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Gain factor to apply right now: 0.0 while muted.
    pub(crate) fn current_gain(&self) -> f32 {
        if self.muted.load(std::sync::atomic::Ordering::Relaxed) {
            0.0
        } else {
            *self.gain.lock().unwrap()
        }
    }
}

/// Media engine playing local files through the default output device.
///
/// Besides the engine contract it exposes software volume control, applied
/// in the output callback.
pub struct LocalEngine {
    volume: Arc<VolumeControl>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self {
            volume: Arc::new(VolumeControl::new()),
        }
    }

    /// Sets the master volume, clamped to 0.0 ..= 1.0.
    pub fn set_volume(&self, volume: f64) {
        *self.volume.gain.lock().unwrap() = volume.clamp(0.0, 1.0) as f32;
    }

    pub fn volume(&self) -> f64 {
        f64::from(*self.volume.gain.lock().unwrap())
    }

    pub fn set_muted(&self, muted: bool) {
        self.volume
            .muted
            .store(muted, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.volume.muted.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for LocalEngine {
    fn create_graph(&self, bus: BusSender) -> Result<Box<dyn EngineGraph>> {
        LocalGraph::new(bus, Arc::clone(&self.volume)).map(|graph| Box::new(graph) as _)
    }
}

/// The shared mix point: sources play in attach order, the front of the
/// queue is audible.
pub(crate) struct MixPoint {
    id: ObjectId,
    sources: Mutex<VecDeque<Arc<SourceShared>>>,
}

impl MixPoint {
    fn new() -> Self {
        Self {
            id: ObjectId::new_v4(),
            sources: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn attach(&self, source: Arc<SourceShared>) {
        self.sources.lock().unwrap().push_back(source);
    }

    pub(crate) fn detach(&self, id: ObjectId) {
        self.sources
            .lock()
            .unwrap()
            .retain(|source| source.id() != id);
    }

    /// The audible source, if any.
    pub(crate) fn active(&self) -> Option<Arc<SourceShared>> {
        self.sources.lock().unwrap().front().cloned()
    }

    /// Drops the audible source from the queue and returns the follow-up.
    pub(crate) fn advance(&self) -> Option<Arc<SourceShared>> {
        let mut sources = self.sources.lock().unwrap();
        sources.pop_front();
        sources.front().cloned()
    }
}

struct LocalGraph {
    bus: BusSender,
    mix: Arc<MixPoint>,
    output: OutputStage,
    level: Level,
    stream_started: bool,
    out_rate: u32,
    out_channels: u16,
}

impl LocalGraph {
    fn new(bus: BusSender, volume: Arc<VolumeControl>) -> Result<Self> {
        let (out_rate, out_channels) = OutputStage::probe_device_format()?;
        log::debug!("output device format: {out_rate} Hz, {out_channels} channels");
        let mix = Arc::new(MixPoint::new());
        let output = OutputStage::new(
            Arc::clone(&mix),
            volume,
            bus.clone(),
            out_rate,
            out_channels,
        )?;
        Ok(Self {
            bus,
            mix,
            output,
            level: Level::Stopped,
            stream_started: false,
            out_rate,
            out_channels,
        })
    }

    fn post_level_step(&self, old: Level, new: Level, pending: Option<Level>) {
        let _ = self.bus.send(BusMessage::LevelChanged { old, new, pending });
    }
}

const LEVEL_ORDER: [Level; 4] = [Level::Stopped, Level::Ready, Level::Paused, Level::Playing];

fn level_index(level: Level) -> usize {
    LEVEL_ORDER
        .iter()
        .position(|candidate| *candidate == level)
        .unwrap_or(0)
}

impl EngineGraph for LocalGraph {
    fn add_source(&mut self, uri: &str, _settings: &SourceSettings) -> Result<Box<dyn SourceNode>> {
        let path = local_path(uri)?;
        let (node, shared) = LocalSourceNode::spawn(
            path,
            uri.to_owned(),
            self.bus.clone(),
            Arc::clone(&self.mix),
            self.out_rate,
            self.out_channels,
        )?;
        self.mix.attach(shared);
        Ok(Box::new(node))
    }

    fn request_level(&mut self, level: Level) -> Result<()> {
        if level == Level::Stopped {
            self.output.stop()?;
            self.level = Level::Stopped;
            self.stream_started = false;
            return Ok(());
        }

        let mut index = level_index(self.level);
        let target_index = level_index(level);

        while index != target_index {
            let old = LEVEL_ORDER[index];
            index = if index < target_index {
                index + 1
            } else {
                index - 1
            };
            let new = LEVEL_ORDER[index];

            match new {
                Level::Ready => self.output.acquire()?,
                Level::Paused => self.output.pause()?,
                Level::Playing => self.output.play()?,
                Level::Stopped => {}
            }
            self.level = new;

            let pending = if index == target_index {
                None
            } else {
                Some(level)
            };
            self.post_level_step(old, new, pending);

            // A fresh unit announces itself at preroll.
            if new == Level::Paused
                && old == Level::Ready
                && !self.stream_started
                && self.mix.active().is_some()
            {
                self.stream_started = true;
                let _ = self.bus.send(BusMessage::StreamStart);
            }
        }

        Ok(())
    }

    fn query_position(&self, unit: PositionUnit) -> Option<i64> {
        match unit {
            PositionUnit::Nanoseconds => self.mix.active().map(|source| source.position_ns()),
            PositionUnit::Bytes => None,
        }
    }

    fn query_duration(&self, unit: PositionUnit) -> Option<i64> {
        match unit {
            PositionUnit::Nanoseconds => self.mix.active().and_then(|source| source.duration_ns()),
            PositionUnit::Bytes => None,
        }
    }

    fn seek(&mut self, position: i64, unit: PositionUnit) -> Result<()> {
        if unit != PositionUnit::Nanoseconds {
            return Err(SegueError::Seek(
                "local sources only seek by time".to_owned(),
            ));
        }
        let Some(active) = self.mix.active() else {
            return Err(SegueError::Seek("nothing to seek".to_owned()));
        };
        self.output.flush();
        active.request_seek(position.max(0))
    }

    fn recalculate_latency(&mut self) {
        // Latency is fixed by the device ring; nothing to redistribute.
    }

    fn mix_point_id(&self) -> ObjectId {
        self.mix.id
    }
}

/// Resolves a URI to a filesystem path. Only `file://` URIs and plain
/// paths are supported.
fn local_path(uri: &str) -> Result<std::path::PathBuf> {
    if let Some(path) = uri.strip_prefix("file://") {
        Ok(std::path::PathBuf::from(path))
    } else if uri.contains("://") {
        Err(SegueError::Media(format!(
            "unsupported URI scheme in {uri}; the local engine only plays files"
        )))
    } else {
        Ok(std::path::PathBuf::from(uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_accepts_files_and_paths() {
        assert_eq!(
            local_path("file:///tmp/a.flac").unwrap(),
            std::path::PathBuf::from("/tmp/a.flac")
        );
        assert_eq!(
            local_path("music/b.ogg").unwrap(),
            std::path::PathBuf::from("music/b.ogg")
        );
        assert!(local_path("http://example.com/radio").is_err());
    }
}
