//! Demo: ein simulierter Video-Anruf von Anfang bis Ende

use anyhow::Context;
use breathbound_lib::call_session::{CallMode, SimulatedDevices};
use breathbound_lib::{init_logging, AppConfig, ChatRoom, SqliteDirectory, SupportDirectory};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!("Starting BreathBound demo with {:?}", config);

    let directory = Arc::new(
        SqliteDirectory::open(&config.database_path).context("failed to open directory")?,
    );
    directory.seed_demo_listeners()?;

    let available = directory.search_listeners("anxiety")?;
    let listener = available
        .first()
        .context("no listener with an anxiety specialty")?;

    let devices = Arc::new(SimulatedDevices::with_latency(Duration::from_millis(150)));
    let mut room = ChatRoom::open(
        "user",
        listener.id,
        directory.clone(),
        devices.clone(),
        config.timings,
    )?;

    room.send_message("Hi, I could use someone to talk to.");
    room.deliver_listener_reply();

    room.offer_incoming_call(CallMode::Video);
    room.accept_incoming_call()?;

    let settle = config.timings.connect_delay + config.timings.remote_preview_delay;
    tokio::time::sleep(settle + Duration::from_millis(500)).await;

    if let Some(call) = room.active_call() {
        call.toggle_mute();
        call.toggle_screen_share().await;
        tokio::time::sleep(config.timings.tick_period * 2).await;

        // Natives "Freigabe beenden" simulieren
        devices.end_screen_capture();
        tokio::time::sleep(config.timings.tick_period).await;

        println!("{}", serde_json::to_string_pretty(&call.snapshot())?);
    }

    let summary = room.end_call()?;
    tracing::info!(
        "Call ended after {} ({} live tracks left)",
        breathbound_lib::call_session::format_duration(summary.elapsed_seconds),
        devices.live_tracks().len()
    );

    for record in directory.sessions_for_client("user")? {
        println!("{}", serde_json::to_string(&record)?);
    }

    Ok(())
}
