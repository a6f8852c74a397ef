//! Publishes simulated sensor readings to the broker the monitor is configured for.
//!
//! Uses the same config file and MQTT_* overrides as the monitor. Extra knobs:
//! - SIMULATOR_INTERVAL_MS  delay between readings (default 2000)
//! - SIMULATOR_COUNT        stop after this many readings (default: run forever)
//! - SIMULATOR_ENGLISH      send English labels instead of the node's Indonesian ones

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use sensor_devkit::{SimulatedSensor, Vocabulary};
use sensor_monitor::load_config;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{key}: cannot parse `{v}`")),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config().await.context("loading monitor configuration")?;
    let interval = Duration::from_millis(env_parse("SIMULATOR_INTERVAL_MS")?.unwrap_or(2000));
    let count: Option<u64> = env_parse("SIMULATOR_COUNT")?;
    let vocab = if std::env::var("SIMULATOR_ENGLISH").is_ok() {
        Vocabulary::English
    } else {
        Vocabulary::Indonesian
    };

    let mqtt = &config.mqtt;
    let mut opts = MqttOptions::new(format!("{}-simulator", mqtt.client_id), &mqtt.host, mqtt.port);
    opts.set_keep_alive(mqtt.keep_alive());
    if let Some(user) = &mqtt.username {
        opts.set_credentials(user, mqtt.password.clone().unwrap_or_default());
    }

    let (client, mut eventloop) = AsyncClient::new(opts, 10);
    let retry_delay = mqtt.reconnect_delay();
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                log::error!("MQTT connection error: {e}");
                tokio::time::sleep(retry_delay).await;
            }
        }
    });

    log::info!("publishing to {} on {}:{} every {:?}", mqtt.topic, mqtt.host, mqtt.port, interval);
    let mut sensor = SimulatedSensor::new(60, vocab);
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if count.is_some_and(|n| sensor.step() >= n) {
            break;
        }
        let payload = sensor.next_payload();
        client
            .publish(mqtt.topic.as_str(), QoS::AtLeastOnce, false, payload.to_string())
            .await
            .context("queueing publish")?;
        log::debug!("sent {payload}");
    }

    // Give the event loop time to flush the last publish.
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.disconnect().await.ok();
    log::info!("sent {} readings", sensor.step());
    Ok(())
}
