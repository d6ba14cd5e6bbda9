use control_panel::{
    api,
    config::Config,
    panel::{Event, Level, Panel, PanelHandle, PanelSettings},
};
use device::{HttpDevice, SimulatedDevice};
use tokio::{net::TcpListener, sync::mpsc};

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load().unwrap_or_else(|err| {
        log::error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    log::info!("Loaded configuration:");
    if config.device.simulate {
        log::info!("  Device: simulated");
    } else {
        log::info!(
            "  Device: {} (timeout {:?})",
            config.device.base_url(),
            config.device.request_timeout()
        );
    }
    log::info!(
        "  Connect delay: {:?}, timeout: {:?}",
        config.session.connect_delay(),
        config.session.connect_timeout()
    );
    log::info!("  Poll interval: {:?}", config.telemetry.poll_interval());
    log::info!("  API: {}", config.api.address());

    let settings = PanelSettings::from(&config);
    let (events_tx, events) = mpsc::unbounded_channel();

    let panel: PanelHandle = if config.device.simulate {
        Panel::new(SimulatedDevice::new(), settings, events_tx).spawn().0
    } else {
        let device = HttpDevice::new(config.device.base_url(), config.device.request_timeout())
            .unwrap_or_else(|err| {
                log::error!("Failed to set up device client: {}", err);
                std::process::exit(1);
            });

        Panel::new(device, settings, events_tx).spawn().0
    };

    tokio::spawn(log_events(events));

    let api_addr = config.api.address();
    let listener = TcpListener::bind(&api_addr).await.unwrap_or_else(|err| {
        log::error!("Failed to bind {}: {}", api_addr, err);
        std::process::exit(1);
    });

    log::info!("Swagger UI available at http://{}/docs", api_addr);

    if let Err(err) = axum::serve(listener, api::router(panel)).await {
        log::error!("API server failed: {}", err);
        std::process::exit(1);
    }
}

/// Stand-in for the panel's status widgets: everything ends up in the log.
async fn log_events(mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            Event::State { state, controls } => {
                log::info!("Connection: {}", state);
                log::debug!("Controls: {:?}", controls);
            }
            Event::Telemetry(sample) => {
                let readings = sample.readings;
                log::info!(
                    "Front {}cm, rear {}cm, smoke {}ppm, battery {}%, signal {}",
                    readings.distance_front_cm,
                    readings.distance_rear_cm,
                    readings.smoke_ppm,
                    readings.battery.percent(),
                    readings
                        .signal_strength_dbm
                        .map(|dbm| format!("{} dBm", dbm))
                        .unwrap_or_else(|| "n/a".to_string()),
                );
            }
            Event::Uptime(uptime) => log::trace!("Uptime: {}", uptime),
            Event::Notice(notice) => match notice.level {
                Level::Error | Level::Warning => log::warn!("{}", notice.message),
                Level::Success | Level::Info => log::info!("{}", notice.message),
            },
        }
    }
}
