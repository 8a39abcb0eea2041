use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::Parser;
use log::{error, info, warn};
use sedge::{client::mqtt_client::rumqtt, node::NodeAgentBuilder};
use tokio::{select, sync::mpsc};

use config::AgentConfig;
use controller::TempController;
use sensor::DhtSensor;

mod config;
mod controller;
mod sensor;

/// Exit code asking the supervisor to restart the agent
const REBOOT_EXIT_CODE: u8 = 75;

/// Sparkplug edge node publishing climate telemetry
#[derive(Parser)]
#[command(name = "sedge-agent")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SEDGE_CONFIG", default_value = "sedge.toml")]
    config: PathBuf,
}

enum Shutdown {
    Interrupted,
    Reboot,
    AgentStopped,
}

async fn run(config: AgentConfig) -> Result<ExitCode, String> {
    let node_id = config.node_id().map_err(|e| e.to_string())?;
    let client_id = config.client_id().map_err(|e| e.to_string())?;

    let mut options = rumqtt::MqttOptions::new(client_id, &config.mqtt.host, config.mqtt.port);
    options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));
    if let (Some(username), Some(password)) = (&config.mqtt.username, &config.mqtt.password) {
        options.set_credentials(username, password);
    }
    let (eventloop, client) = rumqtt::EventLoop::new(options, 10);

    let controller = config.controller.enabled.then(|| {
        Arc::new(Mutex::new(TempController::new(
            config.controller.default_setpoint,
            config.controller.deadband,
        )))
    });
    let mut sensor = DhtSensor::new(config.sensor.device_id.as_str());
    if let Some(controller) = &controller {
        sensor = sensor.with_controller(controller.clone());
    }

    let (reboot_tx, mut reboot_rx) = mpsc::channel::<()>(1);
    let (agent, handle) = NodeAgentBuilder::new(eventloop, client)
        .with_group_id(config.node.group_id.as_str())
        .with_node_id(node_id.as_str())
        .with_telemetry_interval(Duration::from_secs(config.node.telemetry_interval_secs))
        .with_rebirth_cooldown(Duration::from_secs(config.node.rebirth_cooldown_secs))
        .with_telemetry_source(sensor)
        .with_reboot_handler(move || {
            warn!("Reboot requested");
            _ = reboot_tx.try_send(());
        })
        .build()?;

    if let Some(controller) = controller {
        controller::attach(&handle, &config.controller.device_id, controller).await?;
    }

    info!(
        "Starting edge node. group={} node={node_id} broker={}:{}",
        config.node.group_id, config.mqtt.host, config.mqtt.port
    );
    let mut agent_task = tokio::spawn(agent.run());

    let shutdown = select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for CTRL-C: {e}");
            }
            Shutdown::Interrupted
        }
        Some(()) = reboot_rx.recv() => Shutdown::Reboot,
        _ = &mut agent_task => Shutdown::AgentStopped,
    };

    if let Shutdown::AgentStopped = shutdown {
        error!("Edge node stopped unexpectedly. node={node_id}");
        return Ok(ExitCode::FAILURE);
    }

    handle.cancel().await;
    if agent_task.await.is_err() {
        error!("Edge node task failed. node={node_id}");
        return Ok(ExitCode::FAILURE);
    }

    match shutdown {
        Shutdown::Reboot => {
            info!("Exiting for reboot. node={node_id}");
            Ok(ExitCode::from(REBOOT_EXIT_CODE))
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match AgentConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to load {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::new()
        .parse_filters(&config.log.level)
        .parse_default_env()
        .init();

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
