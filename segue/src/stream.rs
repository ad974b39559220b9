//! Per-unit playback state.
//!
//! A [`Stream`] wraps one playable unit: its media, its request token, its
//! playback properties, the engine source node feeding the shared mix
//! point, and the facts learned about the unit while it loads (buffering,
//! liveness, seekability, bitrate).

use crate::engine::{BufferLimits, ObjectId, SourceNode};
use crate::media::Media;
use crate::properties::{
    BUFFER_ESTIMATION_DURATION_DEFAULT, BUFFER_SIZE_LIMIT_DEFAULT, BUFFER_TIMEOUT_DEFAULT,
    HIGH_THRESHOLD_DEFAULT, LOW_THRESHOLD_DEFAULT, PlaybackProperties,
};
use crate::Token;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recently torn-down source roots, kept so late bus messages from them can
/// be suppressed instead of triggering a spurious graph rebuild.
pub(crate) type RetiredIds = Arc<Mutex<VecDeque<ObjectId>>>;

const RETIRED_CAPACITY: usize = 16;

pub(crate) fn retire(retired: &RetiredIds, id: ObjectId) {
    let mut ids = retired.lock().unwrap();
    if ids.len() == RETIRED_CAPACITY {
        ids.pop_front();
    }
    ids.push_back(id);
}

pub(crate) fn is_retired(retired: &RetiredIds, id: ObjectId) -> bool {
    retired.lock().unwrap().contains(&id)
}

/// Facts about a source that become available once its output appears.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OutputFacts {
    pub seekable: Option<bool>,
    pub live: Option<bool>,
}

pub(crate) struct Stream {
    token: Token,
    media: Media,
    properties: PlaybackProperties,
    node: Box<dyn SourceNode>,
    retired: RetiredIds,

    buffering: bool,
    live: Option<bool>,
    seekable: bool,

    bitrate: u32,
    estimation_duration: Duration,
    timeout: Duration,
    size_limit: u32,
    low_threshold: u32,
    high_threshold: u32,
    effective_size_limit: u32,
    timeout_enabled: bool,
    delivery_blocked: bool,
}

impl Stream {
    pub fn new(
        node: Box<dyn SourceNode>,
        token: Token,
        media: Media,
        properties: PlaybackProperties,
        retired: RetiredIds,
    ) -> Self {
        let properties = properties.validated();
        log::debug!(
            "constructing stream for media with URI {} and token {token}",
            media.uri()
        );

        let mut stream = Self {
            token,
            media,
            node,
            retired,
            buffering: false,
            live: None,
            seekable: false,
            bitrate: 0,
            estimation_duration: properties
                .buffer_estimation_duration
                .unwrap_or(BUFFER_ESTIMATION_DURATION_DEFAULT),
            timeout: properties.buffer_timeout.unwrap_or(BUFFER_TIMEOUT_DEFAULT),
            size_limit: properties
                .buffer_size_limit
                .unwrap_or(BUFFER_SIZE_LIMIT_DEFAULT),
            low_threshold: properties.low_threshold.unwrap_or(LOW_THRESHOLD_DEFAULT),
            high_threshold: properties.high_threshold.unwrap_or(HIGH_THRESHOLD_DEFAULT),
            effective_size_limit: 0,
            timeout_enabled: true,
            delivery_blocked: false,
            properties,
        };
        stream.update_buffer_limits();
        stream
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn media(&self) -> &Media {
        &self.media
    }

    pub fn properties(&self) -> &PlaybackProperties {
        &self.properties
    }

    /// True if `origin` identifies this stream's sub-graph.
    pub fn contains(&self, origin: ObjectId) -> bool {
        self.node.id() == origin
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn is_live(&self) -> bool {
        self.live == Some(true)
    }

    pub fn is_live_known(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Queries seekability and liveness from the node. Returns what is
    /// known now; the caller decides which notifications to send.
    pub fn refresh_output_facts(&mut self) -> OutputFacts {
        let facts = OutputFacts {
            seekable: self.node.query_seekable(),
            live: self.node.query_live(),
        };
        if let Some(seekable) = facts.seekable {
            self.seekable = seekable;
        }
        if facts.live.is_some() {
            self.live = facts.live;
        }
        log::debug!(
            "stream facts for {}: seekable: {:?}  live: {:?}",
            self.media.uri(),
            facts.seekable,
            facts.live
        );
        facts
    }

    /// Re-queries liveness only. Returns the status if it is known now.
    pub fn recheck_live(&mut self) -> Option<bool> {
        let live = self.node.query_live();
        if live.is_some() {
            self.live = live;
        }
        live
    }

    /// True if this stream buffers at all: the source must have a stream
    /// buffer, and it must be known to not be live. An unknown liveness
    /// counts as live here, since buffering a live source must never pause
    /// playback.
    pub fn performs_buffering(&self) -> bool {
        self.node.buffers() && self.is_live_known() && !self.is_live()
    }

    /// Records the bitrate once it shows up in metadata, which makes the
    /// duration-based size estimation possible.
    pub fn note_bitrate(&mut self, bitrate: u32) {
        if self.bitrate == 0 && bitrate > 0 {
            log::debug!("found bitrate for {}: {bitrate} bps", self.media.uri());
            self.bitrate = bitrate;
            self.update_buffer_limits();
        }
    }

    pub fn set_buffer_size_limit(&mut self, limit: Option<u32>) {
        self.size_limit = limit.unwrap_or(BUFFER_SIZE_LIMIT_DEFAULT);
        self.update_buffer_limits();
    }

    pub fn set_buffer_estimation_duration(&mut self, duration: Option<Duration>) {
        self.estimation_duration = duration.unwrap_or(BUFFER_ESTIMATION_DURATION_DEFAULT);
        self.update_buffer_limits();
    }

    pub fn set_buffer_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout.unwrap_or(BUFFER_TIMEOUT_DEFAULT);
        self.update_buffer_limits();
    }

    pub fn set_buffer_thresholds(&mut self, low: Option<u32>, high: Option<u32>) {
        let low = low.unwrap_or(LOW_THRESHOLD_DEFAULT);
        let high = high.unwrap_or(HIGH_THRESHOLD_DEFAULT);
        if low >= high {
            log::warn!("ignoring buffer thresholds {low}/{high}: low must stay below high");
            return;
        }
        self.low_threshold = low;
        self.high_threshold = high;
        self.update_buffer_limits();
    }

    /// A next stream may buffer for as long as it wants, so its timeout is
    /// disabled while it waits; re-enabled when it becomes current.
    pub fn enable_buffering_timeout(&mut self, enable: bool) {
        if self.timeout_enabled != enable {
            self.timeout_enabled = enable;
            self.update_buffer_limits();
        }
    }

    /// Parks or releases the source's delivery thread, independent of
    /// playback. Used to starve a preloading next stream while the current
    /// one refills.
    pub fn block_buffering(&mut self, block: bool) {
        if self.delivery_blocked != block {
            log::debug!(
                "{} the buffering of the stream with URI {}",
                if block { "blocking" } else { "unblocking" },
                self.media.uri()
            );
            self.delivery_blocked = block;
        }
        self.node.block_delivery(block);
    }

    pub fn fill_level_bytes(&self) -> Option<u64> {
        self.node.fill_level_bytes()
    }

    pub fn effective_buffer_size_limit(&self) -> u32 {
        self.effective_size_limit
    }

    /// Effective limit is the configured size cap or the size estimated
    /// from bitrate × estimation duration, whichever is smaller. The
    /// estimate only exists once a bitrate is known.
    fn update_buffer_limits(&mut self) {
        let estimated = if self.bitrate > 0 && !self.estimation_duration.is_zero() {
            let bytes = (self.bitrate as u64 / 8).saturating_mul(self.estimation_duration.as_secs())
                + ((self.bitrate as u64 / 8) * self.estimation_duration.subsec_nanos() as u64)
                    / 1_000_000_000;
            log::debug!(
                "estimated a size limit of {bytes} bytes out of a bitrate of {} bps and an \
                 estimation duration of {:?}",
                self.bitrate,
                self.estimation_duration
            );
            bytes.min(u32::MAX as u64) as u32
        } else {
            0
        };

        self.effective_size_limit = if estimated == 0 {
            self.size_limit
        } else {
            self.size_limit.min(estimated)
        };

        let timeout = if self.timeout_enabled && !self.timeout.is_zero() {
            Some(self.timeout)
        } else {
            None
        };

        self.node.apply_buffer_limits(&BufferLimits {
            size_limit_bytes: self.effective_size_limit,
            timeout,
            low_percent: self.low_threshold,
            high_percent: self.high_threshold,
        });
    }
}

impl Drop for Stream {
    // Teardown order matters: mark first so late messages get suppressed,
    // wake any parked delivery thread, release the mix-point connection
    // before stopping so a blocked push observes a flush instead of
    // deadlocking, then pin the level and force the sub-graph down.
    fn drop(&mut self) {
        log::debug!("destroying stream for media with URI {}", self.media.uri());
        self.node.mark_shutting_down();
        retire(&self.retired, self.node.id());
        self.node.block_delivery(false);
        self.node.detach_mix_point();
        self.node.lock_level(true);
        self.node.force_stopped();
        log::debug!("stream for media with URI {} destroyed", self.media.uri());
    }
}
