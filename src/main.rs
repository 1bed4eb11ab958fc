use acs::{CallAutomationClient, QueueClient, RoomsClient};
use anyhow::{Context, Result};
use api::room::RoomSettings;
use recording::{RecordingController, RecordingSettings, RecordingWorker, StorageQueue};
use secrets::Secrets;
use static_toml::static_toml;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

static_toml! { static CONFIG = include_toml!("Config.toml"); }

mod api;
mod dtmf;
mod events;
mod recording;
mod secrets;

#[tokio::main]
async fn main() -> Result<()> {
    // Intitialize environment and logger
    dotenv::dotenv().ok();
    env_logger::init();

    // Load the secrets
    let secrets = Secrets::from_env()?;

    // Initialize the call automation client
    log::info!("Initializing the Call Automation client");
    let call_automation = CallAutomationClient::new(&secrets.acs_connection_string)
        .context("Invalid ACS_CONNECTION_STRING")?;

    // Initialize the rooms client
    log::info!("Initializing the Rooms client");
    let rooms =
        RoomsClient::new(&secrets.acs_connection_string).context("Invalid ACS_CONNECTION_STRING")?;

    // Initialize the storage queue client
    log::info!("Connecting to the storage queue {}", secrets.storage_queue_name);
    let queue = QueueClient::new(&secrets.storage_connection_string, &secrets.storage_queue_name)
        .context("Invalid STORAGE_CONNECTION_STRING")?;

    let recording_settings = RecordingSettings::from_config(secrets.callback_uri()?)?;
    let room_settings = RoomSettings::from_config()?;

    // Start the recording worker, the only owner of the recording session
    log::info!("Starting the recording worker");
    let shutdown = CancellationToken::new();
    let worker = RecordingWorker::new(
        StorageQueue::new(queue),
        RecordingController::new(call_automation.clone(), recording_settings.clone()),
        Duration::from_millis(CONFIG.queue.poll_interval_ms as u64),
    );
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    // Initialize the TCP listener
    log::info!(
        "Connecting to the server at {}",
        CONFIG.settings.local_address
    );
    let tcp = TcpListener::bind(CONFIG.settings.local_address)
        .await
        .context("Failed to connect to the server")?;

    // Initialize the webserver routes
    log::info!("Initializing the webserver routes");
    let router = api::router(call_automation, rooms, recording_settings, room_settings);

    // Start the webserver
    log::info!("Starting the webserver");
    let signal = shutdown.clone();
    axum::serve(tcp, router.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl-c: {e}");
            }
            log::info!("Shutting down");
            signal.cancel();
        })
        .await
        .context("Failed to start the server")?;

    // The server may also stop on its own, so make sure the worker follows
    shutdown.cancel();
    let report = worker.await.context("Recording worker panicked")?;
    log::info!(
        "Recording worker stopped after {} drains, {} messages, {} failures",
        report.drains,
        report.messages,
        report.failures
    );

    Ok(())
}
