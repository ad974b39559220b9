//! Integration tests driving a real player over the scripted mock engine.
//!
//! Callbacks forward every outcome into a channel; the helpers below wait
//! on that channel with timeouts, so nothing here sleeps blindly.

use crossbeam_channel::{Receiver, Sender, unbounded};
use segue::engine::mock::{MockControl, MockEngine};
use segue::{
    Callbacks, Media, PlaybackProperties, PlaybackState, Player, PlayerConfig, PositionUnit,
};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
enum Event {
    State(PlaybackState, PlaybackState),
    Started(String, u64),
    EndOfStream,
    BufferingUpdated {
        uri: String,
        is_current: bool,
        percent: u32,
    },
    Tags(String),
    Seekable(bool, bool),
    Live(bool, bool),
    Duration(Option<i64>),
    Position(i64),
    AboutToEnd(String),
    Info(String),
    Warning(String),
    Error(String),
}

struct Fixture {
    player: Player,
    ctl: MockControl,
    events: Receiver<Event>,
}

fn callbacks(tx: Sender<Event>) -> Callbacks {
    let state_tx = tx.clone();
    let started_tx = tx.clone();
    let eos_tx = tx.clone();
    let buffering_tx = tx.clone();
    let tags_tx = tx.clone();
    let seekable_tx = tx.clone();
    let live_tx = tx.clone();
    let duration_tx = tx.clone();
    let position_tx = tx.clone();
    let about_tx = tx.clone();
    let info_tx = tx.clone();
    let warning_tx = tx.clone();
    let error_tx = tx;

    Callbacks::new()
        .on_state_changed(move |old, new| {
            let _ = state_tx.send(Event::State(old, new));
        })
        .on_media_started(move |media, token| {
            let _ = started_tx.send(Event::Started(media.uri().to_owned(), token));
        })
        .on_end_of_stream(move || {
            let _ = eos_tx.send(Event::EndOfStream);
        })
        .on_buffering_updated(move |media, _token, is_current, percent, _level, _limit| {
            let _ = buffering_tx.send(Event::BufferingUpdated {
                uri: media.uri().to_owned(),
                is_current,
                percent,
            });
        })
        .on_new_tags(move |_media, _token, tags| {
            let _ = tags_tx.send(Event::Tags(tags.to_string()));
        })
        .on_is_seekable(move |_media, _token, is_current, seekable| {
            let _ = seekable_tx.send(Event::Seekable(is_current, seekable));
        })
        .on_is_live(move |_media, _token, is_current, live| {
            let _ = live_tx.send(Event::Live(is_current, live));
        })
        .on_duration_updated(move |_media, _token, duration, unit| {
            if unit == PositionUnit::Nanoseconds {
                let _ = duration_tx.send(Event::Duration(duration));
            }
        })
        .on_position_updated(move |_media, _token, position, _unit| {
            let _ = position_tx.send(Event::Position(position));
        })
        .on_media_about_to_end(move |media, _token| {
            let _ = about_tx.send(Event::AboutToEnd(media.uri().to_owned()));
        })
        .on_info(move |message| {
            let _ = info_tx.send(Event::Info(message.to_owned()));
        })
        .on_warning(move |message| {
            let _ = warning_tx.send(Event::Warning(message.to_owned()));
        })
        .on_error(move |message| {
            let _ = error_tx.send(Event::Error(message.to_owned()));
        })
}

fn fixture() -> Fixture {
    fixture_with_config(PlayerConfig::default())
}

fn fixture_with_config(config: PlayerConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = MockEngine::new();
    let ctl = engine.control();
    let (tx, events) = unbounded();
    let player =
        Player::with_config(Arc::new(engine), callbacks(tx), config).expect("player starts");
    Fixture {
        player,
        ctl,
        events,
    }
}

impl Fixture {
    /// Collects events until `pred` matches one; panics with everything
    /// seen on timeout. Returns the collected events including the match.
    fn wait_for(&self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut seen = Vec::new();
        loop {
            match self.events.recv_timeout(WAIT) {
                Ok(event) => {
                    let matched = pred(&event);
                    seen.push(event);
                    if matched {
                        return seen;
                    }
                }
                Err(_) => panic!("timed out waiting for event; saw: {seen:?}"),
            }
        }
    }

    fn wait_for_state(&self, state: PlaybackState) -> Vec<Event> {
        self.wait_for(|event| matches!(event, Event::State(_, new) if *new == state))
    }

    /// Everything that arrives within the quiet window.
    fn drain_quiet(&self) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.recv_timeout(QUIET) {
            seen.push(event);
        }
        seen
    }

    fn play_now(&self, uri: &str) -> u64 {
        let token = self.player.new_token();
        assert!(self.player.play_media(
            token,
            Media::new(uri),
            true,
            PlaybackProperties::default()
        ));
        token
    }

    fn queue_next(&self, token: u64, uri: &str) {
        assert!(self.player.play_media(
            token,
            Media::new(uri),
            false,
            PlaybackProperties::default()
        ));
    }
}

fn started_uris(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Started(uri, _) => Some(uri.clone()),
            _ => None,
        })
        .collect()
}

fn states_entered(events: &[Event]) -> Vec<PlaybackState> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::State(_, new) => Some(*new),
            _ => None,
        })
        .collect()
}

#[test]
fn invalid_media_is_rejected() {
    let fx = fixture();
    assert!(!fx.player.play_media(
        fx.player.new_token(),
        Media::new(""),
        true,
        PlaybackProperties::default()
    ));
    assert_eq!(fx.player.state(), PlaybackState::Idle);
}

#[test]
fn play_reaches_playing_and_reports_media_started() {
    let fx = fixture();
    let token = fx.play_now("file:///u1");

    // The media announces itself during preroll, before playing is reached.
    let events = fx.wait_for_state(PlaybackState::Playing);
    assert!(states_entered(&events).contains(&PlaybackState::Starting));
    assert!(events.contains(&Event::Started("file:///u1".to_owned(), token)));
}

#[test]
fn stop_returns_to_idle_with_no_further_callbacks() {
    let fx = fixture();
    fx.play_now("file:///u1");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.player.stop();
    let events = fx.wait_for_state(PlaybackState::Idle);
    assert_eq!(
        events.last(),
        Some(&Event::State(PlaybackState::Playing, PlaybackState::Idle))
    );
    assert!(fx.drain_quiet().is_empty());

    // stop is idempotent: nothing further happens on a stopped player
    fx.player.stop();
    assert!(fx.drain_quiet().is_empty());
}

#[test]
fn idle_player_plays_queued_media_immediately() {
    let fx = fixture();
    let token = fx.player.new_token();
    // now=false on an idle player still plays right away
    assert!(fx.player.play_media(
        token,
        Media::new("file:///x"),
        false,
        PlaybackProperties::default()
    ));
    let events = fx.wait_for_state(PlaybackState::Playing);
    assert_eq!(started_uris(&events), vec!["file:///x".to_owned()]);
}

#[test]
fn token_reuse_replaces_queued_next_media() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);

    let follow_up = fx.player.new_token();
    fx.queue_next(follow_up, "file:///b");
    // Same token: C replaces B in the next slot.
    fx.queue_next(follow_up, "file:///c");
    fx.drain_quiet();

    fx.ctl.reach_end_of_current();

    let events = fx.wait_for(|event| matches!(event, Event::Started(..)));
    assert_eq!(started_uris(&events), vec!["file:///c".to_owned()]);
}

#[test]
fn gapless_switch_never_passes_through_idle() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.queue_next(fx.player.new_token(), "file:///b");
    fx.drain_quiet();

    fx.ctl.reach_end_of_current();

    let events = fx.wait_for(|event| matches!(event, Event::Started(uri, _) if uri == "file:///b"));
    assert!(
        !states_entered(&events).contains(&PlaybackState::Idle),
        "idle state observed during gapless switch: {events:?}"
    );
    assert_eq!(fx.player.state(), PlaybackState::Playing);
}

#[test]
fn end_of_stream_without_next_stops_playback() {
    let fx = fixture();
    fx.play_now("file:///only");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.ctl.reach_end_of_current();

    let events = fx.wait_for(|event| matches!(event, Event::EndOfStream));
    assert!(states_entered(&events).contains(&PlaybackState::Idle));
}

#[test]
fn pause_and_resume_round_trip() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);

    fx.player.set_paused(true);
    fx.wait_for_state(PlaybackState::Paused);

    fx.player.set_paused(false);
    fx.wait_for_state(PlaybackState::Playing);
}

#[test]
fn pause_is_ignored_for_live_streams() {
    let fx = fixture();
    fx.ctl.set_default_live(Some(true));
    fx.play_now("file:///radio");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.player.set_paused(true);

    assert!(
        !states_entered(&fx.drain_quiet()).contains(&PlaybackState::Paused),
        "live stream must not pause"
    );
    assert_eq!(fx.player.state(), PlaybackState::Playing);
}

#[test]
fn pause_is_ignored_while_liveness_is_unknown() {
    let fx = fixture();
    fx.ctl.set_default_live(None);
    fx.play_now("file:///unknown");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.player.set_paused(true);
    assert!(!states_entered(&fx.drain_quiet()).contains(&PlaybackState::Paused));
    assert_eq!(fx.player.state(), PlaybackState::Playing);

    // Once liveness resolves to non-live, pausing works.
    fx.ctl.resolve_current_live(false);
    fx.wait_for(|event| matches!(event, Event::Live(true, false)));
    fx.player.set_paused(true);
    fx.wait_for_state(PlaybackState::Paused);
}

#[test]
fn repeated_buffering_reports_toggle_only_once() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    let origin = fx.ctl.current_source_id().expect("current source");
    fx.drain_quiet();

    fx.ctl.post_buffering(origin, 50);
    fx.wait_for_state(PlaybackState::Buffering);
    fx.ctl.post_buffering(origin, 50);
    fx.ctl.post_buffering(origin, 70);

    let quiet = fx.drain_quiet();
    assert!(
        !states_entered(&quiet).contains(&PlaybackState::Buffering),
        "buffering state entered twice: {quiet:?}"
    );

    fx.ctl.post_buffering(origin, 100);
    fx.wait_for_state(PlaybackState::Playing);

    fx.ctl.post_buffering(origin, 100);
    assert!(states_entered(&fx.drain_quiet()).is_empty());
}

#[test]
fn live_stream_buffering_is_reported_but_never_pauses() {
    let fx = fixture();
    fx.ctl.set_default_live(Some(true));
    fx.play_now("file:///radio");
    fx.wait_for_state(PlaybackState::Playing);
    let origin = fx.ctl.current_source_id().expect("current source");
    fx.drain_quiet();

    fx.ctl.post_buffering(origin, 30);

    let events = fx.wait_for(|event| matches!(event, Event::BufferingUpdated { .. }));
    assert!(!states_entered(&events).contains(&PlaybackState::Buffering));
    assert_eq!(
        events.last(),
        Some(&Event::BufferingUpdated {
            uri: "file:///radio".to_owned(),
            is_current: true,
            percent: 30,
        })
    );
}

#[test]
fn next_stream_delivery_is_blocked_while_current_buffers() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.queue_next(fx.player.new_token(), "file:///b");
    fx.drain_quiet();

    let current = fx.ctl.current_source_id().expect("current source");
    let next = fx.ctl.next_source_id().expect("next source");

    // A queued next stream may buffer forever: its timeout is off.
    let info = fx.ctl.source_info(next).expect("next info");
    assert_eq!(info.limits.expect("limits applied").timeout, None);
    assert!(!info.blocked);

    fx.ctl.post_buffering(current, 20);
    fx.wait_for_state(PlaybackState::Buffering);
    assert!(fx.ctl.source_info(next).expect("next info").blocked);

    fx.ctl.post_buffering(current, 100);
    fx.wait_for_state(PlaybackState::Playing);
    assert!(!fx.ctl.source_info(next).expect("next info").blocked);
}

#[test]
fn postponed_pause_requests_collapse_to_the_last_one() {
    let fx = fixture();
    fx.ctl.set_manual_levels(true);
    fx.play_now("file:///a");
    // Liveness resolves from the source probe while the engine level is
    // still held down, so the player is mid-start and must postpone.
    fx.wait_for(|event| matches!(event, Event::Live(true, false)));
    assert_eq!(fx.player.state(), PlaybackState::Starting);

    // Both calls land while transitioning; only the second may apply.
    fx.player.set_paused(true);
    fx.player.set_paused(false);

    // Run the held-back level chain to preroll, then on to playing.
    fx.ctl.complete_level_change();
    fx.wait_for(|event| matches!(event, Event::Started(..)));
    fx.ctl.complete_level_change();
    fx.wait_for_state(PlaybackState::Playing);

    let quiet = fx.drain_quiet();
    assert!(
        !states_entered(&quiet).contains(&PlaybackState::Paused),
        "the overwritten pause(true) was applied: {quiet:?}"
    );
    assert_eq!(fx.player.state(), PlaybackState::Playing);
}

#[test]
fn postponed_play_runs_after_the_transition() {
    let fx = fixture();
    fx.ctl.set_manual_levels(true);
    fx.play_now("file:///a");
    fx.ctl.complete_level_change();
    fx.wait_for(|event| matches!(event, Event::Started(..)));

    // Still starting: an immediate play gets postponed but reports success.
    let token = fx.player.new_token();
    assert!(fx.player.play_media(
        token,
        Media::new("file:///b"),
        true,
        PlaybackProperties::default()
    ));

    fx.ctl.set_manual_levels(false);
    fx.ctl.complete_level_change();

    fx.wait_for(|event| matches!(event, Event::Started(uri, _) if uri == "file:///b"));
}

#[test]
fn seek_round_trips_through_position() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    let target = 5_000_000_000i64;
    fx.player.set_position(target, PositionUnit::Nanoseconds);

    let events = fx.wait_for_state(PlaybackState::Playing);
    assert!(states_entered(&events).contains(&PlaybackState::Seeking));
    assert_eq!(
        fx.ctl.last_seek(),
        Some((target, PositionUnit::Nanoseconds))
    );
    assert_eq!(fx.player.position(PositionUnit::Nanoseconds), Some(target));
}

#[test]
fn seek_while_paused_stays_paused() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.player.set_paused(true);
    fx.wait_for_state(PlaybackState::Paused);
    fx.drain_quiet();

    fx.player.set_position(1_000_000_000, PositionUnit::Nanoseconds);
    let events = fx.wait_for_state(PlaybackState::Paused);
    assert!(states_entered(&events).contains(&PlaybackState::Seeking));
    assert!(!states_entered(&events).contains(&PlaybackState::Playing));
}

#[test]
fn seek_on_a_buffering_stream_refills_before_playing() {
    let fx = fixture();
    fx.ctl.set_sources_buffer(true);
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    let origin = fx.ctl.current_source_id().expect("current source");
    fx.drain_quiet();

    fx.player.set_position(2_000_000_000, PositionUnit::Nanoseconds);

    // The flushed buffer sends the player to buffering, never briefly to
    // playing.
    let events = fx.wait_for_state(PlaybackState::Buffering);
    assert!(!states_entered(&events).contains(&PlaybackState::Playing));

    fx.ctl.post_buffering(origin, 100);
    fx.wait_for_state(PlaybackState::Playing);
}

#[test]
fn failed_seek_restores_the_previous_state() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.ctl.fail_next_seek();
    fx.player.set_position(1_000_000_000, PositionUnit::Nanoseconds);

    let events = fx.wait_for_state(PlaybackState::Playing);
    assert!(states_entered(&events).contains(&PlaybackState::Seeking));
    assert_eq!(fx.player.state(), PlaybackState::Playing);
}

#[test]
fn seek_is_ignored_for_unseekable_media() {
    let fx = fixture();
    fx.ctl.set_default_seekable(Some(false));
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.player.set_position(1_000_000_000, PositionUnit::Nanoseconds);
    assert!(!states_entered(&fx.drain_quiet()).contains(&PlaybackState::Seeking));
    assert_eq!(fx.ctl.last_seek(), None);
}

#[test]
fn start_paused_media_waits_for_resume() {
    let fx = fixture();
    let token = fx.player.new_token();
    assert!(fx.player.play_media(
        token,
        Media::new("file:///a"),
        true,
        PlaybackProperties::new().start_paused(true)
    ));

    fx.wait_for_state(PlaybackState::Paused);
    assert_eq!(fx.player.state(), PlaybackState::Paused);

    fx.player.set_paused(false);
    fx.wait_for_state(PlaybackState::Playing);
}

#[test]
fn start_at_position_seeks_during_startup() {
    let fx = fixture();
    let token = fx.player.new_token();
    let target = 3_000_000_000i64;
    assert!(fx.player.play_media(
        token,
        Media::new("file:///a"),
        true,
        PlaybackProperties::new().start_at(target, PositionUnit::Nanoseconds)
    ));

    fx.wait_for_state(PlaybackState::Playing);
    assert_eq!(
        fx.ctl.last_seek(),
        Some((target, PositionUnit::Nanoseconds))
    );
    assert_eq!(fx.player.position(PositionUnit::Nanoseconds), Some(target));
}

#[test]
fn tag_updates_deliver_only_the_delta() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    let origin = fx.ctl.current_source_id().expect("current source");
    fx.drain_quiet();

    let mut first = segue::TagList::new();
    first.append("title", "A");
    fx.ctl.post_tags(origin, first.clone());
    fx.wait_for(|event| matches!(event, Event::Tags(text) if text == "title=A"));

    let mut second = segue::TagList::new();
    second.append("title", "A");
    second.append("artist", "B");
    fx.ctl.post_tags(origin, second);
    fx.wait_for(|event| matches!(event, Event::Tags(text) if text == "artist=B"));

    // A repeat of known values produces nothing.
    fx.ctl.post_tags(origin, first);
    assert!(
        !fx.drain_quiet()
            .iter()
            .any(|event| matches!(event, Event::Tags(_)))
    );
}

#[test]
fn next_stream_tags_are_not_delivered_as_current() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.queue_next(fx.player.new_token(), "file:///b");
    fx.drain_quiet();

    let next = fx.ctl.next_source_id().expect("next source");
    let mut tags = segue::TagList::new();
    tags.append("title", "next-title");
    fx.ctl.post_tags(next, tags);

    assert!(
        !fx.drain_quiet()
            .iter()
            .any(|event| matches!(event, Event::Tags(_)))
    );
}

#[test]
fn engine_errors_report_and_rebuild_to_idle() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.ctl.post_error(None, "decoder exploded");

    let events = fx.wait_for(|event| matches!(event, Event::Error(_)));
    assert_eq!(
        events.last(),
        Some(&Event::Error("decoder exploded".to_owned()))
    );
    fx.wait_for_state(PlaybackState::Idle);

    // The player is usable again after the self-heal.
    fx.play_now("file:///b");
    fx.wait_for_state(PlaybackState::Playing);
}

#[test]
fn teardown_runs_the_full_shutdown_sequence() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    let origin = fx.ctl.current_source_id().expect("current source");

    fx.player.stop();
    fx.wait_for_state(PlaybackState::Idle);

    let info = fx.ctl.source_info(origin).expect("source record");
    assert!(info.shutting_down);
    assert!(info.detached);
    assert!(info.level_locked);
    assert!(info.stopped);
    assert!(info.removed);
}

#[test]
fn info_and_warning_messages_are_forwarded_verbatim() {
    let fx = fixture();
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    fx.drain_quiet();

    fx.ctl.post_info("just so you know");
    fx.ctl.post_warning("this may hurt");

    fx.wait_for(|event| matches!(event, Event::Info(text) if text == "just so you know"));
    fx.wait_for(|event| matches!(event, Event::Warning(text) if text == "this may hurt"));
    // Neither message changes state.
    assert_eq!(fx.player.state(), PlaybackState::Playing);
}

#[test]
fn duration_updates_are_cached_and_reported() {
    let fx = fixture();
    fx.ctl.set_duration(Some(42_000_000_000), None);
    fx.play_now("file:///a");
    fx.wait_for(|event| matches!(event, Event::Duration(Some(42_000_000_000))));
    assert_eq!(
        fx.player.duration(PositionUnit::Nanoseconds),
        Some(42_000_000_000)
    );
    assert_eq!(fx.player.duration(PositionUnit::Bytes), None);
}

#[test]
fn position_updates_and_about_to_end_fire_from_the_tick() {
    let fx = fixture_with_config(
        PlayerConfig::new()
            .update_interval(Duration::from_millis(25))
            .about_to_end_threshold(Duration::from_secs(5)),
    );
    fx.ctl.set_duration(Some(10_000_000_000), None);
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);

    fx.ctl.set_position(Some(6_000_000_000));
    fx.wait_for(|event| matches!(event, Event::Position(6_000_000_000)));
    fx.wait_for(|event| matches!(event, Event::AboutToEnd(uri) if uri == "file:///a"));

    // The notification is latched: later ticks never repeat it.
    assert!(
        !fx.drain_quiet()
            .iter()
            .any(|event| matches!(event, Event::AboutToEnd(_)))
    );
}

#[test]
fn postponed_tags_flush_with_the_tick() {
    let fx = fixture_with_config(PlayerConfig::new().update_interval(Duration::from_millis(25)));
    fx.play_now("file:///a");
    fx.wait_for_state(PlaybackState::Playing);
    let origin = fx.ctl.current_source_id().expect("current source");
    fx.drain_quiet();

    fx.player.force_postpone_tag("title", true);
    let mut tags = segue::TagList::new();
    tags.append("title", "Delayed");
    tags.append("artist", "Immediate");
    fx.ctl.post_tags(origin, tags);

    // The artist arrives immediately, the title only with a later tick.
    fx.wait_for(|event| matches!(event, Event::Tags(text) if text == "artist=Immediate"));
    fx.wait_for(|event| matches!(event, Event::Tags(text) if text == "title=Delayed"));
}

#[test]
fn queries_on_an_idle_player_return_unknown() {
    let fx = fixture();
    assert_eq!(fx.player.position(PositionUnit::Nanoseconds), None);
    assert_eq!(fx.player.duration(PositionUnit::Nanoseconds), None);
    assert_eq!(fx.player.state(), PlaybackState::Idle);
    assert!(!fx.player.is_transitioning());
}

#[test]
fn tokens_are_unique_and_monotonic() {
    let fx = fixture();
    let first = fx.player.new_token();
    let second = fx.player.new_token();
    let third = fx.player.new_token();
    assert!(first < second && second < third);
}
