//! Playback properties and position units.

use std::time::Duration;

/// Units for positions and durations.
///
/// Some media only support one of the two. Queries in an unsupported unit
/// return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionUnit {
    /// Timestamps in nanoseconds.
    Nanoseconds,
    /// Byte offsets into the source.
    Bytes,
}

impl PositionUnit {
    pub fn description(&self) -> &'static str {
        match self {
            PositionUnit::Nanoseconds => "nanoseconds",
            PositionUnit::Bytes => "bytes",
        }
    }
}

/// Transports permitted for packet-based network sources.
///
/// Stream-based connections (HTTP and the like) ignore these; they always
/// run over TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transports {
    pub udp: bool,
    pub tcp: bool,
}

impl Default for Transports {
    fn default() -> Self {
        Self {
            udp: true,
            tcp: true,
        }
    }
}

/// Default duration used for bitrate-based buffer size estimation.
pub const BUFFER_ESTIMATION_DURATION_DEFAULT: Duration = Duration::from_secs(2);
/// Default buffering timeout.
pub const BUFFER_TIMEOUT_DEFAULT: Duration = Duration::from_secs(2);
/// Default stream buffer size limit, in bytes.
pub const BUFFER_SIZE_LIMIT_DEFAULT: u32 = 2 * 1024 * 1024;
/// Default low watermark, in percent.
pub const LOW_THRESHOLD_DEFAULT: u32 = 10;
/// Default high watermark, in percent.
pub const HIGH_THRESHOLD_DEFAULT: u32 = 99;
/// Default grace period for late packets on packet-based sources.
pub const JITTER_BUFFER_LENGTH_DEFAULT: Duration = Duration::from_secs(2);

/// Optional per-request playback properties.
///
/// Absent buffering fields mean "use the default". The low watermark must
/// stay below the high watermark; [`PlaybackProperties::validated`] clamps a
/// violating pair back to the defaults.
///
/// ```
/// use segue::PlaybackProperties;
/// use std::time::Duration;
///
/// let props = PlaybackProperties::new()
///     .start_paused(true)
///     .buffer_timeout(Duration::from_secs(5));
/// assert!(props.start_paused);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlaybackProperties {
    /// Start playback paused instead of playing.
    pub start_paused: bool,
    /// If > 0, seek here before playback begins.
    pub start_at: i64,
    /// Unit for `start_at`.
    pub start_at_unit: Option<PositionUnit>,
    /// Duration used together with the bitrate to estimate a buffer size.
    pub buffer_estimation_duration: Option<Duration>,
    /// Cap on how long a buffering phase may run before it is declared done.
    pub buffer_timeout: Option<Duration>,
    /// Maximum stream buffer size, in bytes.
    pub buffer_size_limit: Option<u32>,
    /// Low buffering watermark, in percent.
    pub low_threshold: Option<u32>,
    /// High buffering watermark, in percent.
    pub high_threshold: Option<u32>,
    /// Grace period for late packets on packet-based sources.
    pub jitter_buffer_length: Option<Duration>,
    /// Ask the server to retransmit lost packets.
    pub allow_retransmission: Option<bool>,
    /// Which transports packet-based sources may use.
    pub allowed_transports: Option<Transports>,
}

impl PlaybackProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    pub fn start_at(mut self, position: i64, unit: PositionUnit) -> Self {
        self.start_at = position;
        self.start_at_unit = Some(unit);
        self
    }

    pub fn buffer_estimation_duration(mut self, duration: Duration) -> Self {
        self.buffer_estimation_duration = Some(duration);
        self
    }

    pub fn buffer_timeout(mut self, timeout: Duration) -> Self {
        self.buffer_timeout = Some(timeout);
        self
    }

    pub fn buffer_size_limit(mut self, bytes: u32) -> Self {
        self.buffer_size_limit = Some(bytes);
        self
    }

    pub fn thresholds(mut self, low: u32, high: u32) -> Self {
        self.low_threshold = Some(low);
        self.high_threshold = Some(high);
        self
    }

    pub fn jitter_buffer_length(mut self, length: Duration) -> Self {
        self.jitter_buffer_length = Some(length);
        self
    }

    pub fn allow_retransmission(mut self, allow: bool) -> Self {
        self.allow_retransmission = Some(allow);
        self
    }

    pub fn allowed_transports(mut self, transports: Transports) -> Self {
        self.allowed_transports = Some(transports);
        self
    }

    /// Returns the properties with an invalid watermark pair reset.
    pub fn validated(mut self) -> Self {
        let low = self.low_threshold.unwrap_or(LOW_THRESHOLD_DEFAULT);
        let high = self.high_threshold.unwrap_or(HIGH_THRESHOLD_DEFAULT);
        if low >= high {
            log::warn!(
                "low buffering threshold {low}% is not below high threshold {high}%; \
                 falling back to defaults"
            );
            self.low_threshold = None;
            self.high_threshold = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_absent() {
        let props = PlaybackProperties::default();
        assert!(!props.start_paused);
        assert_eq!(props.start_at, 0);
        assert!(props.buffer_size_limit.is_none());
        assert!(props.low_threshold.is_none());
    }

    #[test]
    fn validated_resets_inverted_thresholds() {
        let props = PlaybackProperties::new().thresholds(80, 20).validated();
        assert!(props.low_threshold.is_none());
        assert!(props.high_threshold.is_none());

        let props = PlaybackProperties::new().thresholds(5, 95).validated();
        assert_eq!(props.low_threshold, Some(5));
        assert_eq!(props.high_threshold, Some(95));
    }
}
