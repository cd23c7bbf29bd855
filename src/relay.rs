use crate::config::{MqttConfig, RelayConfig};
use crate::error::Result;
use crate::influx::PowerSink;
use crate::model::{PowerModel, PredictError};
use crate::mqtt::{self, FeedEvent};
use crate::reading::{parse_power, Reading};
use crate::ws::hub::Hub;
use crate::ws::protocol::ServerMessage;
use chrono::{Local, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Owns the MQTT subscription and sequences parse → broadcast → persist →
/// predict → broadcast for every inbound message. No per-message fault is
/// allowed to escape the loop; the subscription outlives them all.
pub struct Relay {
    mqtt: MqttConfig,
    relay: RelayConfig,
    hub: Arc<Hub>,
    sink: PowerSink,
    model: PowerModel,
}

impl Relay {
    pub fn new(
        mqtt: MqttConfig,
        relay: RelayConfig,
        hub: Arc<Hub>,
        sink: PowerSink,
        model: PowerModel,
    ) -> Self {
        Self {
            mqtt,
            relay,
            hub,
            sink,
            model,
        }
    }

    /// Drive the feed until the task is dropped. Transport drops trigger
    /// reconnect with exponential backoff, unbounded attempts; the broker
    /// is long-lived infrastructure and the relay waits for it.
    pub async fn run(self) -> Result<()> {
        let options = mqtt::build_options(&self.mqtt)?;
        let (client, mut eventloop) = mqtt::connect(options);

        let mut backoff = INITIAL_BACKOFF;
        loop {
            match mqtt::next_event(&mut eventloop).await {
                Ok(FeedEvent::Connected) => {
                    // Resubscribe on every ConnAck so a reconnect restores
                    // the subscription without extra bookkeeping
                    match client
                        .subscribe(self.mqtt.topic.clone(), mqtt::qos(self.mqtt.qos))
                        .await
                    {
                        Ok(()) => {
                            info!(topic = %self.mqtt.topic, "subscribed to power feed");
                            backoff = INITIAL_BACKOFF;
                        }
                        Err(e) => warn!(error = %e, "subscribe request failed"),
                    }
                }
                Ok(FeedEvent::Publish(publish)) => {
                    self.handle_publish(publish.payload.as_ref());
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "feed lost; reconnecting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Process one feed message. Synchronous and non-blocking: the live
    /// broadcast goes out before persistence or prediction is attempted,
    /// and neither of those is waited on.
    pub fn handle_publish(&self, payload: &[u8]) {
        let power_kw = match parse_power(payload, self.relay.max_power_kw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, payload = %String::from_utf8_lossy(payload), "dropping unparseable reading");
                return;
            }
        };

        let reading = Reading::new(&self.relay.device_id, power_kw);

        let delivered = self.hub.broadcast(&ServerMessage::power_data(power_kw));
        debug!(power_kw, delivered, "reading relayed");

        self.sink.submit(reading.clone());

        self.spawn_prediction(&reading);
    }

    /// Forecast for the reading's local hour on a detached task and
    /// broadcast the result. A not-ready model means no broadcast at all;
    /// the dashboard tolerates absence.
    fn spawn_prediction(&self, reading: &Reading) {
        let hour = reading.observed_at.with_timezone(&Local).hour();
        let model = self.model.clone();
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            match model.predict(hour) {
                Ok(predicted_kw) => {
                    let delivered = hub.broadcast(&ServerMessage::predicted_power(predicted_kw));
                    debug!(hour, predicted_kw, delivered, "prediction relayed");
                }
                Err(PredictError::NotReady) => {
                    debug!(hour, "prediction model not ready; skipping broadcast");
                }
                Err(e) => warn!(hour, error = %e, "prediction failed"),
            }
        });
    }
}
