//! GoDAM CLI
//!
//! Headless tooling for the player remote-control protocol: decode raw
//! messages, check origins against an allowlist, and drive a client against
//! a scripted in-process player.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use godam_player::core::origin::OriginAllowlist;
use godam_player::ipc::memory::{MemoryContentWindow, MemoryFrame, MemoryHost};
use godam_player::ipc::{event_names, InboundEnvelope};
use godam_player::{ClientOptions, Listener, RemoteControlClient};

const PLAYER_ORIGIN: &str = "https://player.godam.local";

#[derive(Parser)]
#[command(name = "godam-cli", about = "GoDAM player remote-control tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a raw inbound message (JSON) the way the client classifies it
    Decode {
        /// Message data, e.g. '{"type":"godam:ready","payload":{}}'
        message: String,
    },
    /// Check whether an origin passes an allowlist
    CheckOrigin {
        /// Allowed origin pattern; repeatable. Defaults to `*`.
        #[arg(long = "allow")]
        allow: Vec<String>,
        origin: String,
    },
    /// Run the client against a scripted loopback player
    Simulate {
        /// Client options file (JSON, camelCase keys)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Make the player answer this command with an error
        #[arg(long)]
        fail: Option<String>,
        /// Media duration reported by the player, in seconds
        #[arg(long, default_value_t = 120.0)]
        duration: f64,
    },
}

fn init_logging() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Decode { message } => decode(&message),
        Command::CheckOrigin { allow, origin } => check_origin(&allow, &origin),
        Command::Simulate {
            config,
            fail,
            duration,
        } => simulate(config, fail, duration).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn decode(message: &str) -> Result<()> {
    let data: Value = serde_json::from_str(message).context("Message is not valid JSON")?;
    match InboundEnvelope::decode(&data) {
        Ok(envelope) => print_json(&envelope),
        Err(reason) => print_json(&json!({ "rejected": reason, "reason": reason.to_string() })),
    }
}

fn check_origin(allow: &[String], origin: &str) -> Result<()> {
    let options = ClientOptions::with_allowed_origins(allow.iter().cloned());
    let allowlist = OriginAllowlist::new(&options.allowed_origins);

    let allowed = allowlist.is_allowed(origin);
    println!("{} {}", if allowed { "allowed" } else { "rejected" }, origin);
    if !allowed {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Loopback Player
// =============================================================================

/// Media state of the scripted player
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerState {
    playing: bool,
    current_time: f64,
    duration: f64,
    volume: f64,
    muted: bool,
}

/// Answers every command posted to a memory content window
struct LoopbackPlayer {
    host: MemoryHost,
    window: Rc<MemoryContentWindow>,
    state: RefCell<PlayerState>,
    fail: Option<String>,
}

impl LoopbackPlayer {
    fn broadcast(&self, data: Value) {
        self.host.dispatch(PLAYER_ORIGIN, data);
    }

    fn announce_ready(&self) {
        let duration = self.state.borrow().duration;
        self.broadcast(json!({ "type": "godam:ready", "payload": { "duration": duration } }));
    }

    fn emit(&self, event: &str, data: Value) {
        self.broadcast(json!({ "type": "godam:event", "payload": { "event": event, "data": data } }));
    }

    /// Replies to all posted commands in order. Returns how many were answered.
    fn respond(&self) -> usize {
        let posted = self.window.take_posted();
        for message in &posted {
            let message_type = message["type"].as_str().unwrap_or_default();
            let command = message_type.strip_prefix("godam:").unwrap_or(message_type);
            let id = message["id"].clone();

            if self.fail.as_deref() == Some(command) {
                self.broadcast(json!({
                    "type": format!("godam:{}:error", command),
                    "id": id,
                    "payload": { "message": format!("{} rejected by player", command) },
                }));
                continue;
            }

            let (payload, events) = self.apply(command, &message["payload"]);
            self.broadcast(json!({ "type": message_type, "id": id, "payload": payload }));
            for (name, data) in events {
                self.emit(name, data);
            }
        }
        posted.len()
    }

    /// Applies a command to the media state. Returns the response payload
    /// and the events the player broadcasts afterwards.
    fn apply(&self, command: &str, args: &Value) -> (Value, Vec<(&'static str, Value)>) {
        let mut state = self.state.borrow_mut();
        match command {
            "play" => {
                state.playing = true;
                (json!({}), vec![(event_names::PLAY, json!({}))])
            }
            "pause" => {
                state.playing = false;
                (json!({}), vec![(event_names::PAUSE, json!({}))])
            }
            "seek" => {
                let time = args["time"].as_f64().unwrap_or(0.0);
                state.current_time = time.clamp(0.0, state.duration);
                let time = state.current_time;
                let mut events = vec![
                    (event_names::SEEKED, json!({ "time": time })),
                    (event_names::TIME_UPDATE, json!({ "time": time })),
                ];
                if time >= state.duration {
                    state.playing = false;
                    events.push((event_names::ENDED, json!({ "time": time })));
                }
                (json!({}), events)
            }
            "setVolume" => {
                state.volume = args["volume"].as_f64().unwrap_or(state.volume);
                let volume = state.volume;
                (json!({}), vec![(event_names::VOLUME_CHANGE, json!({ "volume": volume }))])
            }
            "setMuted" => {
                state.muted = args["muted"].as_bool().unwrap_or(state.muted);
                let muted = state.muted;
                (json!({}), vec![(event_names::VOLUME_CHANGE, json!({ "muted": muted }))])
            }
            "getCurrentTime" => (json!({ "time": state.current_time }), Vec::new()),
            "getDuration" => (json!({ "duration": state.duration }), Vec::new()),
            "getVolume" => (json!({ "volume": state.volume }), Vec::new()),
            "getMuted" => (json!({ "muted": state.muted }), Vec::new()),
            _ => (json!({}), Vec::new()),
        }
    }
}

async fn simulate(config: Option<PathBuf>, fail: Option<String>, duration: f64) -> Result<()> {
    let options = match config {
        Some(path) => ClientOptions::load_from_file(&path)?,
        None => ClientOptions::default().with_debug_logs(true),
    };

    let host = MemoryHost::new();
    let frame = MemoryFrame::iframe();
    host.insert_element("#godam-player", frame.clone());
    let Some(window) = frame.window() else {
        bail!("Loopback frame has no content window");
    };

    let client = RemoteControlClient::new(Rc::new(host.clone()), "#godam-player", options)?;
    let player = LoopbackPlayer {
        host,
        window,
        state: RefCell::new(PlayerState {
            playing: false,
            current_time: 0.0,
            duration,
            volume: 1.0,
            muted: false,
        }),
        fail,
    };

    for event in [
        event_names::READY,
        event_names::PLAY,
        event_names::PAUSE,
        event_names::SEEKED,
        event_names::TIME_UPDATE,
        event_names::VOLUME_CHANGE,
        event_names::ENDED,
    ] {
        client.on(
            event,
            Listener::new(move |data| println!("event  {:<14} {}", event, data)),
        );
    }

    let ready = client.ready();
    player.announce_ready();
    println!("ready  {}", ready.await?);

    report("play", {
        let done = client.play();
        player.respond();
        done.await.map(|_| Value::Null)
    });
    report("seek", {
        let done = client.seek(42.5)?;
        player.respond();
        done.await.map(|_| Value::Null)
    });
    report("getCurrentTime", {
        let time = client.get_current_time();
        player.respond();
        time.await.map(Value::from)
    });
    report("setVolume", {
        let done = client.set_volume(0.4)?;
        player.respond();
        done.await.map(|_| Value::Null)
    });
    report("getVolume", {
        let volume = client.get_volume();
        player.respond();
        volume.await.map(Value::from)
    });
    report("setMuted", {
        let done = client.set_muted(true);
        player.respond();
        done.await.map(|_| Value::Null)
    });
    report("getMuted", {
        let muted = client.get_muted();
        player.respond();
        muted.await.map(Value::from)
    });
    report("getDuration", {
        let total = client.get_duration();
        player.respond();
        total.await.map(Value::from)
    });
    report("pause", {
        let done = client.pause();
        player.respond();
        done.await.map(|_| Value::Null)
    });
    report("seek", {
        let done = client.seek(duration)?;
        player.respond();
        done.await.map(|_| Value::Null)
    });

    print_json(&*player.state.borrow())?;
    println!("posted {} messages", player.window.post_attempts());
    client.destroy();
    info!("Simulation finished");
    Ok(())
}

fn report(command: &str, outcome: godam_player::ClientResult<Value>) {
    match outcome {
        Ok(Value::Null) => println!("ok     {}", command),
        Ok(value) => println!("ok     {} -> {}", command, value),
        Err(err) => {
            let retry = if err.is_retryable() { " (retryable)" } else { "" };
            println!("error  {}: {}{}", err.command().unwrap_or(command), err, retry);
        }
    }
}
