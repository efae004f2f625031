//! CHP 代理：周期轮询 Dachs GLT 寄存器并维持远程控制心跳。

mod poller;

use chp_config::AgentConfig;
use chp_protocol::{ChpClient, RegisterCatalog};
use chp_telemetry::{init_tracing, metrics};
use poller::{LastGood, client_config, heartbeat_once, poll_once, resolve_keys};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AgentConfig::from_env()?;
    init_tracing();

    let catalog = RegisterCatalog::dachs()?;
    let keys = resolve_keys(&catalog, config.keys.as_deref());
    let client = ChpClient::modbus_tcp(client_config(&config), catalog);
    info!(
        target: "chp.agent",
        host = %config.host,
        port = config.port,
        unit_id = config.unit_id,
        keys = keys.len(),
        poll_interval_seconds = config.poll_interval_seconds,
        heartbeat = config.heartbeat_active(),
        "chp agent starting"
    );

    let heartbeat_pin = config.glt_pin.filter(|_| config.heartbeat_active());
    if let Some(pin) = heartbeat_pin {
        heartbeat_once(&client, pin).await;
    }

    if let Some(watts) = config.electrical_setpoint_w {
        if let Err(err) = client.write_electrical_setpoint(watts).await {
            warn!(target: "chp.control", requested_w = watts, error = %err, "failed to write electrical setpoint");
        }
    }

    let mut poll_tick = interval(Duration::from_secs(config.poll_interval_seconds));
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut heartbeat_tick = interval(Duration::from_secs(config.heartbeat_interval_seconds));
    heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 启动时已发送过一次心跳
    heartbeat_tick.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_good = LastGood::default();
    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                poll_once(&client, &keys, &mut last_good).await;
            }
            _ = heartbeat_tick.tick(), if heartbeat_pin.is_some() => {
                if let Some(pin) = heartbeat_pin {
                    heartbeat_once(&client, pin).await;
                }
            }
            _ = &mut shutdown => {
                info!(target: "chp.agent", "shutdown requested");
                break;
            }
        }
    }

    client.close().await;
    let snapshot = metrics().snapshot();
    info!(
        target: "chp.agent",
        read_success = snapshot.read_success,
        read_failure = snapshot.read_failure,
        heartbeats_sent = snapshot.heartbeats_sent,
        reconnects = snapshot.connects,
        "chp agent stopped"
    );
    Ok(())
}
