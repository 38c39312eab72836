pub mod config;
pub mod dispatcher;
pub mod formatter;
pub mod mqtt;
pub mod signal;

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Args, SubscriberConfig};
use crate::dispatcher::Dispatcher;
use crate::formatter::{MessageFormatter, OutputMode};
use crate::mqtt::message_manager::message_channel;
use crate::mqtt::mqtt_handler::MqttHandler;

/// Time given to the session to flush the DISCONNECT before the process exits.
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

const EXIT_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Help is handled here and exits 0 before anything else is set up
    let args = Args::parse_normalized();

    setup()?;

    let config = match SubscriberConfig::resolve(args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };

    run(config).await
}

async fn run(config: SubscriberConfig) -> Result<ExitCode> {
    let formatter = MessageFormatter::new(OutputMode::from_raw_flag(config.raw));
    let (sender, receiver) = message_channel();

    info!("Output mode: {:?}", formatter.mode());

    let mut handler = MqttHandler::new(config.mqtt, sender);

    if let Err(e) = handler.connect().await {
        eprintln!("Failed to connect to broker: {}", e);
        return Ok(ExitCode::from(EXIT_FAILURE));
    }

    if let Err(e) = handler.subscribe().await {
        eprintln!("Failed to subscribe: {}", e);
        return Ok(ExitCode::from(EXIT_FAILURE));
    }

    handler.start_delivery()?;
    let shutdown = signal::shutdown_on_signal()?;

    println!("Subscribed to {} ...", handler.topic());

    let mut dispatcher = Dispatcher::new(formatter, receiver, io::stdout());
    let stats = dispatcher.run(shutdown).await;

    handler.disconnect(DISCONNECT_GRACE).await;
    println!("Disconnected");

    let status = handler.status();
    info!(
        "Session {:?}, last activity {:?}",
        status.connection_state, status.last_activity
    );
    info!(
        "Received {} messages: {} printed, {} dropped, {} write errors",
        stats.received, stats.printed, stats.dropped, stats.write_errors
    );

    Ok(ExitCode::SUCCESS)
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    // stdout carries the messages, diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
