//! SMS Simulator Daemon
//!
//! Runs one simulated device: a virtual modem, the message switch and the
//! TCP listener other simulator instances connect to. Settings are read from
//! the path given as the first argument, or from the user's config directory.

mod settings;

use std::path::PathBuf;

use anyhow::Context;
use settings::Settings;
use sms_protocol::SimPduCodec;
use sms_sim::VirtualModem;
use sms_switch::{listener, spawn_switch, SmsSimulator, SwitchEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sms_simd=info,sms_protocol=info,sms_switch=info,sms_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SMS simulator");

    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(Settings::settings_path);
    let settings = match &settings_path {
        Some(path) => {
            let settings = Settings::load_from(path);
            if !path.exists() {
                match settings.save_to(path) {
                    Ok(()) => info!("Wrote default settings to {}", path.display()),
                    Err(e) => warn!("{}", e),
                }
            }
            settings
        }
        None => Settings::default(),
    };

    let modem = VirtualModem::new(settings.modem.clone());
    let state = modem.state();
    info!(
        "Virtual modem: number '{}', {}, registration {:?}",
        state.subscriber_number,
        state.radio_technology.name(),
        state.registration
    );

    let simulator = SmsSimulator::new(settings.switch.clone(), modem.handle(), SimPduCodec::new());
    let (switch, actor_task) = spawn_switch(simulator);

    let mut new_messages = switch.subscribe_new_messages().await?;
    let mut storage_full = switch.subscribe_storage_full().await?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(indication) = new_messages.recv() => {
                    info!(
                        "New {} message in {} storage at index {}",
                        indication.protocol.name(),
                        indication.class,
                        indication.index
                    );
                }
                Some(indication) = storage_full.recv() => {
                    match indication.class {
                        Some(class) => warn!("{} storage is full", class),
                        None => warn!("Message storage is full"),
                    }
                }
                else => break,
            }
        }
    });

    if settings.log_traffic {
        tokio::spawn(log_events(switch.subscribe_events()));
    }

    let tcp = listener::bind(&settings.switch)
        .await
        .with_context(|| format!("binding peer listener on {}", settings.switch.listen_addr()))?;
    let listener_task = tokio::spawn(listener::run_listener(
        tcp,
        switch.clone(),
        settings.switch.peer_queue_depth,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");

    listener_task.abort();
    if let Err(e) = switch.shutdown().await {
        warn!("Switch already stopped: {}", e);
    }
    actor_task.await.context("switch actor panicked")?;

    Ok(())
}

/// Log switch events until the switch stops
async fn log_events(mut events: broadcast::Receiver<SwitchEvent>) {
    loop {
        match events.recv().await {
            Ok(SwitchEvent::FrameReceived {
                handle,
                origin,
                destination,
                protocol,
                len,
            }) => info!(
                "Peer {}: {} frame from '{}' to '{}' ({} bytes)",
                handle.0,
                protocol.name(),
                origin,
                destination,
                len
            ),
            Ok(SwitchEvent::FrameSent { peers, len }) => {
                info!("Sent {} byte frame to {} peer(s)", len, peers)
            }
            Ok(SwitchEvent::ProtocolViolation { handle, message }) => {
                warn!("Peer {} disconnected: {}", handle.0, message)
            }
            Ok(SwitchEvent::InboundDropped { reason }) => warn!("Inbound message dropped: {}", reason),
            Ok(event) => debug!("{:?}", event),
            Err(RecvError::Lagged(n)) => warn!("Event log skipped {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}
