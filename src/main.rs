use homebot::bus::EventBus;
use homebot::command::CommandHandler;
use homebot::config::{load_dotenv, Config};
use homebot::gateway::{self, ConsoleGateway, DiscordGateway, MsgGateway};
use homebot::hue::{BridgeClient, HueClient};
use homebot::motion::MotionDetector;
use homebot::poller::SensorPoller;
use homebot::speedtest::SpeedTest;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    init_logger();
    load_dotenv();
    info!("Starting HomeBot");

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }
    info!("Configuration loaded:");
    info!("  Bridge host: {}", config.hue.host);
    info!("  Poll interval: {}ms", config.poller.poll_interval_ms);
    info!("  Tracked sensors: {:?}", config.poller.tracked_sensors);
    info!("  Motion alarm: {} ({:?})", config.motion.enabled, config.motion.watched_sensors);

    let bridge: Arc<dyn BridgeClient> = match HueClient::new(&config.hue) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create bridge client: {}", e);
            std::process::exit(1);
        }
    };

    // Connectivity probe; a dead bridge is not fatal, polling self-heals.
    match bridge.identity().await {
        Ok(identity) => info!("Connected to Hue Bridge: {} :: {}", identity.name, identity.address),
        Err(e) => warn!("Bridge not reachable yet: {}", e),
    }

    let bus = Arc::new(EventBus::new());
    let poller = SensorPoller::new(
        Arc::clone(&bridge),
        Arc::clone(&bus),
        &config.poller,
    );
    poller.attach_to_bus();
    let motion = MotionDetector::new(Arc::clone(&bus), &config.motion);

    let mut gateways: Vec<Arc<dyn MsgGateway>> = vec![Arc::new(ConsoleGateway::new())];
    if let Some(url) = &config.gateway.discord_webhook_url {
        match DiscordGateway::new(url) {
            Ok(discord) => {
                info!("Discord webhook notifications enabled");
                gateways.push(Arc::new(discord));
            }
            Err(e) => warn!("Disabling Discord notifications: {}", e),
        }
    }
    let (_subscriptions, relay_task) = gateway::spawn_notification_relay(
        &bus,
        gateways,
        config.gateway.notify_sensor_changes,
    );

    // Arm after the relay subscriptions exist so polling starts exactly when
    // the first consumer appears.
    motion.set_enabled(config.motion.enabled);

    let speedtest = match SpeedTest::from_config(&config.speedtest) {
        Ok(speedtest) => speedtest.map(Arc::new),
        Err(e) => {
            warn!("Disabling speed test command: {}", e);
            None
        }
    };

    let shutdown = CancellationToken::new();
    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&bridge),
        Arc::clone(&poller),
        Arc::clone(&motion),
        speedtest,
        config.gateway.command_prefix.clone(),
        shutdown.clone(),
    ));
    let console_task = ConsoleGateway::spawn_command_loop(handler, shutdown.clone());

    info!("HomeBot is running");
    info!("  - Type commands on stdin (try `status`)");
    info!("  - Press Ctrl+C to exit");

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
        _ = shutdown.cancelled() => info!("Shutdown requested via command"),
    }
    shutdown.cancel();

    poller.shutdown().await;
    relay_task.abort();
    console_task.abort();
    info!("HomeBot stopped");
}
