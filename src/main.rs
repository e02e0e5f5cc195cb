use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use tutor_call_lib::media::SampleMediaSource;
use tutor_call_lib::notify::{ChannelSink, SessionNotification};
use tutor_call_lib::peer::RtcEngineFactory;
use tutor_call_lib::session::{self, SessionHandle, SessionParts, SessionStateMachine};
use tutor_call_lib::utils::{format_elapsed, random_id};
use tutor_call_lib::{logger, ParticipantRole, SessionConfig, WsSignalingChannel};

#[derive(Parser, Debug)]
#[command(name = "tutor-call", version, about = "Join the tutoring queue and run one call")]
struct Cli {
    /// Signaling service WebSocket URL; overrides the config file.
    #[arg(long, env = "TUTOR_CALL_URL")]
    url: Option<String>,

    /// Participant id announced to the service.
    #[arg(long, env = "TUTOR_CALL_PARTICIPANT")]
    participant: Option<String>,

    /// initiator|responder (student|teacher are accepted too).
    #[arg(long, env = "TUTOR_CALL_ROLE", default_value = "initiator")]
    role: ParticipantRole,

    #[arg(long)]
    no_video: bool,

    #[arg(long)]
    no_audio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();

    let mut config = SessionConfig::load().context("loading configuration")?;
    if let Some(url) = cli.url {
        config.signaling.url = url;
    }
    config.media.audio &= !cli.no_audio;
    config.media.video &= !cli.no_video;
    let participant = cli.participant.unwrap_or_else(random_id);

    let (inputs, receiver) = session::inbox();
    let channel =
        WsSignalingChannel::connect(&config.signaling.url, inputs.clone(), config.keepalive())
            .await?;
    let (sink, mut notifications) = ChannelSink::new();

    let parts = SessionParts {
        media: Box::new(SampleMediaSource::new(format!("tutor-call-{participant}"))),
        channel: Box::new(channel),
        engines: Box::new(RtcEngineFactory::new(config.ice_servers.clone())),
        sink: Arc::new(sink),
    };
    let machine = SessionStateMachine::new(participant.clone(), cli.role, config, parts, inputs);
    let mut handle = SessionHandle::spawn(machine, receiver);

    info!("joining as {participant} ({})", cli.role);
    handle.start().await.context("starting the call")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("hanging up");
                handle.end();
                break;
            }
            note = notifications.recv() => {
                let Some(note) = note else { break };
                let done = matches!(
                    note,
                    SessionNotification::Ended { .. } | SessionNotification::Error(_)
                );
                print_notification(&note);
                if done {
                    break;
                }
            }
        }
    }

    handle.finished().await;
    Ok(())
}

fn print_notification(note: &SessionNotification) {
    let now = chrono::Local::now().format("%H:%M:%S");
    match note {
        SessionNotification::StateChanged { from, to } => println!("[{now}] {from} -> {to}"),
        SessionNotification::Matched { session_id, peer } => println!(
            "[{now}] matched in {session_id} with {}",
            peer.name.as_deref().unwrap_or("a partner")
        ),
        SessionNotification::Waiting(message) => println!("[{now}] {message}"),
        SessionNotification::RemoteTrack(track) => {
            println!("[{now}] receiving {} from the peer", track.kind)
        }
        SessionNotification::PeerToggled { kind, enabled } => println!(
            "[{now}] peer turned {kind} {}",
            if *enabled { "on" } else { "off" }
        ),
        SessionNotification::Connection(state) => println!("[{now}] connection {state:?}"),
        SessionNotification::Tick { elapsed } => println!("[{now}] {}", format_elapsed(*elapsed)),
        SessionNotification::Error(err) => eprintln!("[{now}] call failed: {err}"),
        SessionNotification::Ended { reason, duration } => match duration {
            Some(d) => println!("[{now}] call ended ({}) after {}", reason.as_str(), format_elapsed(*d)),
            None => println!("[{now}] call ended ({})", reason.as_str()),
        },
    }
}
