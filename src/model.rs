use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{error, info};

/// The model artifact: expected generation for each local hour of the day,
/// trained offline and shipped as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarCurve {
    /// Artifact identifier, logged on load.
    #[serde(default)]
    pub model: Option<String>,
    /// Expected output in kW for local hours 0 through 23.
    pub hourly_kw: Vec<f64>,
}

impl SolarCurve {
    fn validate(&self) -> Result<(), AppError> {
        if self.hourly_kw.len() != 24 {
            return Err(AppError::Model(format!(
                "artifact must hold 24 hourly values, got {}",
                self.hourly_kw.len()
            )));
        }
        if self.hourly_kw.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(AppError::Model(
                "artifact hourly values must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    /// Terminal until the process restarts; there is no in-process reload.
    LoadFailed,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("prediction model is not ready")]
    NotReady,
    #[error("hour {0} outside 0..=23")]
    HourOutOfRange(u32),
}

#[derive(Debug)]
enum ModelInner {
    Unloaded,
    Loading,
    Ready(SolarCurve),
    LoadFailed,
}

/// Forecasts instantaneous solar output for a given local hour.
///
/// The artifact is loaded once, asynchronously, after startup; until then
/// (and forever after a failed load) `predict` returns `NotReady` instead of
/// blocking, and callers are expected to skip the prediction.
#[derive(Debug, Clone)]
pub struct PowerModel {
    inner: Arc<RwLock<ModelInner>>,
}

impl Default for PowerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerModel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ModelInner::Unloaded)),
        }
    }

    /// Build a model that is ready immediately. Used by tests and tooling
    /// that already hold a curve.
    pub fn from_curve(curve: SolarCurve) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ModelInner::Ready(curve))),
        }
    }

    pub fn state(&self) -> ModelState {
        match *self.inner.read().unwrap() {
            ModelInner::Unloaded => ModelState::Unloaded,
            ModelInner::Loading => ModelState::Loading,
            ModelInner::Ready(_) => ModelState::Ready,
            ModelInner::LoadFailed => ModelState::LoadFailed,
        }
    }

    /// Load the artifact from disk. Failures are logged and leave the model
    /// in `LoadFailed`; the relay keeps running without predictions.
    pub async fn load(&self, path: &str) {
        *self.inner.write().unwrap() = ModelInner::Loading;

        match read_artifact(path).await {
            Ok(curve) => {
                info!(
                    path,
                    model = curve.model.as_deref().unwrap_or("unnamed"),
                    "prediction model loaded"
                );
                *self.inner.write().unwrap() = ModelInner::Ready(curve);
            }
            Err(e) => {
                error!(
                    path,
                    error = %e,
                    "failed to load prediction model; predictions disabled until restart"
                );
                *self.inner.write().unwrap() = ModelInner::LoadFailed;
            }
        }
    }

    /// Forecast output for a local hour. Deterministic once the artifact is
    /// loaded: the same hour always yields the same value.
    pub fn predict(&self, hour: u32) -> Result<f64, PredictError> {
        if hour > 23 {
            return Err(PredictError::HourOutOfRange(hour));
        }
        match &*self.inner.read().unwrap() {
            ModelInner::Ready(curve) => Ok(curve.hourly_kw[hour as usize]),
            _ => Err(PredictError::NotReady),
        }
    }
}

async fn read_artifact(path: &str) -> Result<SolarCurve, AppError> {
    let raw = tokio::fs::read(path).await?;
    let curve: SolarCurve = serde_json::from_slice(&raw)?;
    curve.validate()?;
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn flat_curve(kw: f64) -> SolarCurve {
        SolarCurve {
            model: Some("test-curve".into()),
            hourly_kw: vec![kw; 24],
        }
    }

    fn write_temp_artifact(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.json", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_predict_before_load_is_not_ready() {
        let model = PowerModel::new();
        assert_eq!(model.state(), ModelState::Unloaded);
        assert_eq!(model.predict(12), Err(PredictError::NotReady));
    }

    #[test]
    fn test_predict_is_deterministic_once_ready() {
        let model = PowerModel::from_curve(flat_curve(5.0));
        assert_eq!(model.state(), ModelState::Ready);

        assert_ok!(model.predict(12));
        assert_eq!(model.predict(0), Ok(5.0));
        assert_eq!(model.predict(12), Ok(5.0));
        assert_eq!(model.predict(12), Ok(5.0));
        assert_eq!(model.predict(23), Ok(5.0));
    }

    #[test]
    fn test_predict_rejects_out_of_range_hour() {
        let model = PowerModel::from_curve(flat_curve(5.0));
        assert_eq!(model.predict(24), Err(PredictError::HourOutOfRange(24)));
    }

    #[tokio::test]
    async fn test_load_from_valid_artifact() {
        let hourly: Vec<f64> = (0..24).map(|h| h as f64 / 10.0).collect();
        let json = serde_json::json!({ "model": "unit-test", "hourly_kw": hourly }).to_string();
        let path = write_temp_artifact("solar-relay-model-ok", &json);

        let model = PowerModel::new();
        model.load(path.to_str().unwrap()).await;

        assert_eq!(model.state(), ModelState::Ready);
        assert_eq!(model.predict(13), Ok(1.3));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let model = PowerModel::new();
        model.load("/nonexistent/solar_power_model.json").await;

        assert_eq!(model.state(), ModelState::LoadFailed);
        assert_eq!(model.predict(12), Err(PredictError::NotReady));
    }

    #[tokio::test]
    async fn test_load_malformed_artifact_fails() {
        let path = write_temp_artifact("solar-relay-model-bad", "{ not json");

        let model = PowerModel::new();
        model.load(path.to_str().unwrap()).await;
        assert_eq!(model.state(), ModelState::LoadFailed);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_load_rejects_wrong_curve_length() {
        let json = serde_json::json!({ "hourly_kw": [1.0, 2.0, 3.0] }).to_string();
        let path = write_temp_artifact("solar-relay-model-short", &json);

        let model = PowerModel::new();
        model.load(path.to_str().unwrap()).await;
        assert_eq!(model.state(), ModelState::LoadFailed);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_load_rejects_negative_values() {
        let mut hourly = vec![0.5; 24];
        hourly[3] = -0.1;
        let json = serde_json::json!({ "hourly_kw": hourly }).to_string();
        let path = write_temp_artifact("solar-relay-model-negative", &json);

        let model = PowerModel::new();
        model.load(path.to_str().unwrap()).await;
        assert_eq!(model.state(), ModelState::LoadFailed);

        std::fs::remove_file(&path).ok();
    }
}
