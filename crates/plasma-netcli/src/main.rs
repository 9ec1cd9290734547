//! Headless Plasma network client.
//!
//! Connects to a game server, optionally links into an age, and runs the
//! client session at a fixed tick until the server ends it or Ctrl-C.
//!
//! Run with: `cargo run -p plasma-netcli -- --server 127.0.0.1 --age Cleft`

mod host;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use plasma_config::{CliArgs, Config};
use plasma_net::{
    ConnectionState, FrameConfig, GameClient, Location, Message, PagingRoom, PlayerId, Uoid,
    drain_channel, message_channel,
};
use plasma_session::{
    AgeLink, Clock, LinkEvent, NetClientSession, SessionEvent, SessionSettings,
};
use tracing::{error, info, warn};

use crate::host::HeadlessHost;

const TICK: Duration = Duration::from_millis(33);

/// CLI arguments for the headless client.
#[derive(Parser, Debug)]
#[command(name = "plasma-netcli", about = "Headless Plasma network client")]
struct NetcliArgs {
    #[command(flatten)]
    common: CliArgs,

    /// Player id to log in as.
    #[arg(long, default_value_t = 1)]
    player_id: PlayerId,

    /// Age to link into after connecting.
    #[arg(long)]
    age: Option<String>,

    /// Players whose voice and chat are muted.
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<PlayerId>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = NetcliArgs::parse();

    let config_dir = args
        .common
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.common);

    let log_dir = config_dir.join("logs");
    plasma_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: NetcliArgs, config: Config) -> std::io::Result<()> {
    let target = (config.network.server_address.as_str(), config.network.server_port);
    let addr = tokio::net::lookup_host(target)
        .await?
        .next()
        .ok_or_else(|| std::io::Error::other("server address did not resolve"))?;

    let (inbox_tx, mut inbox_rx) = message_channel(config.network.inbox_capacity);
    let frame_config = FrameConfig::with_max(config.network.max_frame_bytes);
    let connect = GameClient::connect(addr, frame_config, inbox_tx);
    let client = tokio::time::timeout(
        Duration::from_secs(u64::from(config.network.request_timeout_secs)),
        connect,
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;

    let mut session = NetClientSession::new(SessionSettings::from(&config), args.player_id);
    let mut host = HeadlessHost::new();
    for &player in &args.ignore {
        host.ignore(player);
    }
    let local_avatar = Uoid::new(Location::new(0), 0x0001, "Avatar").cloned_for(1, args.player_id);
    host.set_local_avatar(local_avatar);

    if let Some(age) = args.age {
        if let Err(e) = session.link_to_age(AgeLink::new(age)) {
            warn!("link refused: {e}");
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(TICK);
    let mut quitting = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c, if !quitting => {
                info!("interrupt received, leaving age");
                session.leave_age(true);
                quitting = true;
            }
        }

        for wire in drain_channel(&mut inbox_rx) {
            session.receive(wire);
        }
        host.finish_transitions(&mut session);
        session.update(&mut host);

        let mut stop = false;
        for event in session.drain_events() {
            stop |= handle_event(&event, &mut session, &mut host, args.player_id, quitting);
        }

        for out in session.drain_outgoing() {
            if let Err(e) = client.send(&out.wire).await {
                warn!(channel = ?out.channel, "send failed: {e}");
            }
        }

        if stop || client.state().current() == ConnectionState::Disconnected {
            break;
        }
    }

    info!(states = host.states_applied, "session ended");
    session.shutdown();
    client.disconnect();
    Ok(())
}

/// React to one session event. Returns `true` when the client should exit.
fn handle_event(
    event: &SessionEvent,
    session: &mut NetClientSession,
    host: &mut HeadlessHost,
    local_player: PlayerId,
    quitting: bool,
) -> bool {
    match event {
        SessionEvent::RosterChanged => {
            info!(members = session.transport().len(), "roster changed");
        }
        SessionEvent::StartListening(id) => info!(player_id = id, "listening"),
        SessionEvent::StopListening(id) => info!(player_id = id, "stopped listening"),
        SessionEvent::GameMessage { player_id, msg, .. } => {
            info!(?player_id, msg_type = ?msg.msg_type(), "game message");
        }
        SessionEvent::LoadClone(clone) => {
            if clone.is_loading {
                host.load_object(clone.clone.clone());
            } else if clone.player_id != local_player {
                host.unload_object(&clone.clone);
            }
        }
        SessionEvent::UnloadRemoteAvatar { avatar, .. } => host.unload_object(avatar),
        SessionEvent::OwnershipChanged { is_owner } => info!(is_owner, "ownership changed"),
        SessionEvent::AllInitialStatesReceived { count } => {
            info!(count, "age state loaded");
            let paging = Message::PagingRoom(PagingRoom {
                player_id: local_player,
                rooms: vec![Location::new(0)],
                paging_out: false,
            });
            let sys_now = host.sys_now();
            if let Err(e) = session.send(paging, sys_now) {
                warn!("could not announce paging: {e}");
            }
        }
        SessionEvent::Terminated { reason } => warn!(%reason, "server ended the session"),
        SessionEvent::NetDisabled { reason, .. } => {
            error!(%reason, "networking disabled");
            return true;
        }
        SessionEvent::Link(LinkEvent::Joined(link)) => info!(age = %link.age_name, "in age"),
        SessionEvent::Link(LinkEvent::JoinFailed { link, reason }) => {
            warn!(age = %link.age_name, %reason, "link failed");
        }
        SessionEvent::Link(LinkEvent::Left | LinkEvent::LeaveFailed { .. }) => return quitting,
        SessionEvent::Link(_) => {}
    }
    false
}
