//! Line-oriented demo player driving segue through its public API.
//!
//! Every asynchronous outcome is printed to stderr as it arrives; commands
//! are read from stdin. Start with one or two file paths to play the first
//! immediately and queue the second for a gapless follow-up.

mod tokenizer;

use anyhow::Result;
use segue::engine::MediaEngine;
use segue::engine::local::LocalEngine;
use segue::{Callbacks, Media, PlaybackProperties, PlaybackState, Player, PositionUnit};
use std::io::{BufRead, Write};
use std::sync::Arc;

const NANOS_PER_MSEC: i64 = 1_000_000;

struct CommandHelp {
    name: &'static str,
    args: &'static str,
    required: usize,
    description: &'static str,
}

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "play",
        args: "<URI> <now yes/no>",
        required: 1,
        description: "plays new media with a given URI; if the second parameter is \"no\", the \
                      media will be played after the current one, or right now if nothing is \
                      currently playing",
    },
    CommandHelp {
        name: "pause",
        args: "<pause yes/no>",
        required: 1,
        description: "pauses any current playback; if the parameter is \"yes\", pauses, \
                      otherwise unpauses; if nothing is playing, this call is ignored",
    },
    CommandHelp {
        name: "ispaused",
        args: "",
        required: 0,
        description: "checks if playback is currently paused",
    },
    CommandHelp {
        name: "stop",
        args: "",
        required: 0,
        description: "stops any current playback",
    },
    CommandHelp {
        name: "seek",
        args: "<seek position in milliseconds>",
        required: 1,
        description: "seeks to the given position if playback allows for seeking",
    },
    CommandHelp {
        name: "tell",
        args: "",
        required: 0,
        description: "prints the current playback position in milliseconds",
    },
    CommandHelp {
        name: "setvolume",
        args: "<volume>",
        required: 1,
        description: "sets the current volume in the 0.0 .. 1.0 range",
    },
    CommandHelp {
        name: "getvolume",
        args: "",
        required: 0,
        description: "gets the current volume in the 0.0 .. 1.0 range",
    },
    CommandHelp {
        name: "mute",
        args: "<mute yes/no>",
        required: 1,
        description: "mutes playback if argument is \"yes\", unmutes otherwise",
    },
    CommandHelp {
        name: "ismuted",
        args: "",
        required: 0,
        description: "checks if playback is currently muted",
    },
    CommandHelp {
        name: "help",
        args: "",
        required: 0,
        description: "lists the commands",
    },
    CommandHelp {
        name: "quit",
        args: "",
        required: 0,
        description: "exits the player",
    },
];

fn print_commands() {
    let width = COMMANDS
        .iter()
        .map(|command| command.name.len() + 1 + command.args.len())
        .max()
        .unwrap_or(0);

    eprintln!("Command list:\n");
    for command in COMMANDS {
        let usage = if command.args.is_empty() {
            command.name.to_owned()
        } else {
            format!("{} {}", command.name, command.args)
        };
        eprintln!("  {usage:width$} : {}", command.description);
    }
    eprintln!();
}

fn print_callbacks() -> Callbacks {
    Callbacks::new()
        .on_media_started(|media, token| {
            eprintln!("Media started with uri {} and token {token}", media.uri());
        })
        .on_end_of_stream(|| {
            eprintln!("End-Of-Stream reported");
        })
        .on_state_changed(|old, new| {
            eprintln!("State change: old: {old} new: {new}");
        })
        .on_buffering_updated(|media, token, is_current, percent, _level, _limit| {
            eprintln!(
                "Buffering: {percent}  media uri: {} token: {token}  current: {is_current}",
                media.uri()
            );
        })
        .on_duration_updated(|media, token, duration, unit| {
            let text = match (duration, unit) {
                (Some(value), PositionUnit::Nanoseconds) => {
                    format!("{} ms", value / NANOS_PER_MSEC)
                }
                (Some(value), PositionUnit::Bytes) => format!("{value} bytes"),
                (None, _) => "unknown".to_owned(),
            };
            eprintln!(
                "Current duration for media with URI {} and token {token}: {text}",
                media.uri()
            );
        })
        .on_position_updated(|media, token, position, unit| {
            if unit == PositionUnit::Nanoseconds {
                eprintln!(
                    "Current position for media with URI {} and token {token} in ms: {}",
                    media.uri(),
                    position / NANOS_PER_MSEC
                );
            }
        })
        .on_media_about_to_end(|media, token| {
            eprintln!(
                "Media with uri {} and token {token} about to end",
                media.uri()
            );
        })
        .on_is_seekable(|media, _token, is_current, seekable| {
            eprintln!(
                "Media with uri {} is seekable: {seekable} (current: {is_current})",
                media.uri()
            );
        })
        .on_is_live(|media, _token, is_current, live| {
            eprintln!(
                "Media with uri {} is live: {live} (current: {is_current})",
                media.uri()
            );
        })
        .on_new_tags(|media, token, tags| {
            eprintln!(
                "New tags for current media with URI {} and token {token}: {tags}",
                media.uri()
            );
        })
        .on_info(|message| eprintln!("Info message: {message}"))
        .on_warning(|message| eprintln!("Warning message: {message}"))
        .on_error(|message| eprintln!("Error message: {message}"))
}

fn main() -> Result<()> {
    env_logger::init();

    segue::engine::init();
    let result = run();
    segue::engine::deinit();
    result
}

fn run() -> Result<()> {
    let engine = Arc::new(LocalEngine::new());
    let player = Player::new(
        Arc::clone(&engine) as Arc<dyn MediaEngine>,
        print_callbacks(),
    )?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(uri) = args.first() {
        player.play_media(
            player.new_token(),
            Media::new(uri),
            true,
            PlaybackProperties::default(),
        );
    }
    if let Some(uri) = args.get(1) {
        player.play_media(
            player.new_token(),
            Media::new(uri),
            false,
            PlaybackProperties::default(),
        );
    }

    eprintln!("Type help to get a list of valid commands\n");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("cmd> ");
        std::io::stderr().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        let tokens = tokenizer::tokenize_line(&line);
        let Some(command) = tokens.first() else {
            continue;
        };

        let Some(help) = COMMANDS.iter().find(|entry| entry.name == command) else {
            eprintln!("Unknown command \"{command}\"");
            continue;
        };
        if tokens.len() < help.required + 1 {
            eprintln!(
                "Not enough arguments: expected: {} got: {}",
                help.required,
                tokens.len() - 1
            );
            eprintln!("  Usage: {} {}", help.name, help.args);
            continue;
        }

        match command.as_str() {
            "play" => {
                let now = tokens.get(2).map(|choice| choice != "no").unwrap_or(true);
                player.play_media(
                    player.new_token(),
                    Media::new(&tokens[1]),
                    now,
                    PlaybackProperties::default(),
                );
            }
            "pause" => player.set_paused(tokens[1] == "yes"),
            "ispaused" => {
                let paused = player.state() == PlaybackState::Paused;
                eprintln!("Is currently paused: {}", if paused { "yes" } else { "no" });
            }
            "stop" => player.stop(),
            "seek" => match tokens[1].parse::<i64>() {
                Ok(milliseconds) => player.set_position(
                    milliseconds * NANOS_PER_MSEC,
                    PositionUnit::Nanoseconds,
                ),
                Err(_) => eprintln!("Not a valid position: {}", tokens[1]),
            },
            "tell" => match player.position(PositionUnit::Nanoseconds) {
                Some(position) => {
                    eprintln!("Current position in ms: {}", position / NANOS_PER_MSEC);
                }
                None => eprintln!("Current position is unknown"),
            },
            "setvolume" => match tokens[1].parse::<f64>() {
                Ok(volume) => engine.set_volume(volume),
                Err(_) => eprintln!("Not a valid volume: {}", tokens[1]),
            },
            "getvolume" => eprintln!("Current volume: {}", engine.volume()),
            "mute" => engine.set_muted(tokens[1] == "yes"),
            "ismuted" => {
                let muted = engine.is_muted();
                eprintln!("Is currently muted: {}", if muted { "yes" } else { "no" });
            }
            "help" => print_commands(),
            "quit" => break,
            _ => unreachable!("command table and dispatch out of sync"),
        }
    }

    Ok(())
}
