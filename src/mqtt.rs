use crate::config::MqttConfig;
use crate::error::AppError;
use std::time::Duration;
use uuid::Uuid;

// Use the MQTT v5 API surface only
use rumqttc::v5 as mqtt5;
use rumqttc::Transport;

// Re-export types so the rest of the code can use these names
pub type MqttOptions = mqtt5::MqttOptions;
pub type AsyncClient = mqtt5::AsyncClient;
pub type EventLoop = mqtt5::EventLoop;
pub type V5Publish = mqtt5::mqttbytes::v5::Publish;

/// Feed events the relay cares about. Everything else the event loop
/// produces (acks, pings) is swallowed.
#[derive(Debug)]
pub enum FeedEvent {
    /// Broker accepted the connection. Emitted on every (re)connect, so the
    /// relay can resubscribe after a transport drop.
    Connected,
    Publish(V5Publish),
}

pub fn build_options(cfg: &MqttConfig) -> Result<MqttOptions, AppError> {
    let client_id = format!("solar-relay-{}", Uuid::new_v4());
    // Using v5::MqttOptions selects MQTT 5
    let mut opts = MqttOptions::new(client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.unwrap_or(30)));
    opts.set_clean_start(cfg.clean_session.unwrap_or(true));
    if let (Some(u), Some(p)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(u.clone(), p.clone());
    }
    if cfg.port == 8883 {
        opts.set_transport(Transport::tls_with_default_config());
    }
    Ok(opts)
}

pub fn connect(options: MqttOptions) -> (AsyncClient, EventLoop) {
    mqtt5::AsyncClient::new(options, 50)
}

// Return the v5 QoS type explicitly
pub fn qos(v: u8) -> mqtt5::mqttbytes::QoS {
    match v {
        2 => mqtt5::mqttbytes::QoS::ExactlyOnce,
        0 => mqtt5::mqttbytes::QoS::AtMostOnce,
        _ => mqtt5::mqttbytes::QoS::AtLeastOnce,
    }
}

pub async fn next_event(eventloop: &mut EventLoop) -> Result<FeedEvent, AppError> {
    loop {
        match eventloop.poll().await {
            Ok(mqtt5::Event::Incoming(mqtt5::Incoming::ConnAck(_))) => {
                return Ok(FeedEvent::Connected)
            }
            Ok(mqtt5::Event::Incoming(mqtt5::Incoming::Publish(p))) => {
                return Ok(FeedEvent::Publish(p))
            }
            Ok(_) => continue,
            Err(e) => return Err(AppError::Mqtt(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::QoS;

    fn test_config(port: u16) -> MqttConfig {
        MqttConfig {
            host: "broker.example.com".into(),
            port,
            topic: "solar/power".into(),
            username: None,
            password: None,
            qos: 0,
            keep_alive_secs: Some(45),
            clean_session: Some(true),
        }
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
        // Anything unexpected falls back to at-least-once
        assert_eq!(qos(7), QoS::AtLeastOnce);
    }

    #[test]
    fn test_build_options_sets_broker_and_keep_alive() {
        let opts = build_options(&test_config(1883)).unwrap();
        assert_eq!(opts.broker_address(), ("broker.example.com".into(), 1883));
        assert_eq!(opts.keep_alive(), Duration::from_secs(45));
    }

    #[test]
    fn test_build_options_unique_client_ids() {
        let a = build_options(&test_config(1883)).unwrap();
        let b = build_options(&test_config(1883)).unwrap();
        assert_ne!(a.client_id(), b.client_id());
        assert!(a.client_id().starts_with("solar-relay-"));
    }
}
