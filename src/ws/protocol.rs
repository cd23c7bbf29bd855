use serde::{Deserialize, Serialize};

/// Events pushed to every live subscriber. The `event` tag and field names
/// match what the dashboard frontend listens for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerMessage {
    PowerData {
        power: f64,
    },
    #[serde(rename_all = "camelCase")]
    PredictedPower {
        predicted_power: f64,
    },
}

impl ServerMessage {
    pub fn power_data(power: f64) -> Self {
        ServerMessage::PowerData { power }
    }

    pub fn predicted_power(predicted_power: f64) -> Self {
        ServerMessage::PredictedPower { predicted_power }
    }
}
