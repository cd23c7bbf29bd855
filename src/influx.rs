use crate::config::InfluxConfig;
use crate::error::AppError;
use crate::reading::Reading;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Counters for the sink's observable behavior. Persistence faults are
/// reported here and in the log, never raised back to the caller.
#[derive(Debug, Default)]
pub struct SinkStats {
    submitted: AtomicU64,
    written: AtomicU64,
    failed_writes: AtomicU64,
    dropped: AtomicU64,
}

impl SinkStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Buffered writer to the InfluxDB v2 write API.
///
/// Readings are handed over through a bounded channel and flushed by a
/// background task once `batch_size` accumulate or `linger_ms` elapses.
/// A full buffer or a failed flush never blocks or stops ingestion.
pub struct PowerSink {
    tx: mpsc::Sender<Reading>,
    stats: Arc<SinkStats>,
}

impl PowerSink {
    pub fn spawn(client: reqwest::Client, cfg: InfluxConfig) -> Self {
        let stats = Arc::new(SinkStats::default());
        let (tx, rx) = mpsc::channel::<Reading>(cfg.batch_size * 4);

        tokio::spawn(writer_task(client, cfg, rx, Arc::clone(&stats)));

        Self { tx, stats }
    }

    /// Hand a reading to the writer, fire-and-forget. When the buffer is
    /// full the reading is dropped and counted; ingestion is never blocked
    /// by a slow store.
    pub fn submit(&self, reading: Reading) {
        match self.tx.try_send(reading) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "sink buffer full; dropping reading");
            }
        }
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        Arc::clone(&self.stats)
    }
}

async fn writer_task(
    client: reqwest::Client,
    cfg: InfluxConfig,
    mut rx: mpsc::Receiver<Reading>,
    stats: Arc<SinkStats>,
) {
    let mut buffer: Vec<Reading> = Vec::with_capacity(cfg.batch_size);
    loop {
        let timeout = tokio::time::sleep(Duration::from_millis(cfg.linger_ms));
        tokio::pin!(timeout);
        tokio::select! {
            biased;
            received = rx.recv() => {
                match received {
                    Some(reading) => {
                        buffer.push(reading);
                        if buffer.len() >= cfg.batch_size {
                            flush(&client, &cfg, &mut buffer, &stats).await;
                        }
                    }
                    None => {
                        // Channel closed: drain what is left, then stop
                        flush(&client, &cfg, &mut buffer, &stats).await;
                        debug!("sink channel closed; writer task exiting");
                        return;
                    }
                }
            }
            _ = &mut timeout => {
                flush(&client, &cfg, &mut buffer, &stats).await;
            }
        }
    }
}

async fn flush(
    client: &reqwest::Client,
    cfg: &InfluxConfig,
    buffer: &mut Vec<Reading>,
    stats: &SinkStats,
) {
    if buffer.is_empty() {
        return;
    }
    let count = buffer.len() as u64;
    let body = buffer
        .iter()
        .map(|r| line_protocol(&cfg.measurement, r))
        .collect::<Vec<_>>()
        .join("\n");
    buffer.clear();

    match write_lines(client, cfg, body).await {
        Ok(()) => {
            stats.written.fetch_add(count, Ordering::Relaxed);
            debug!(count, "batch flushed to InfluxDB");
        }
        Err(e) => {
            stats.failed_writes.fetch_add(count, Ordering::Relaxed);
            error!(count, error = %e, "InfluxDB write failed; readings lost");
        }
    }
}

async fn write_lines(
    client: &reqwest::Client,
    cfg: &InfluxConfig,
    body: String,
) -> Result<(), AppError> {
    let response = client
        .post(format!("{}/api/v2/write", cfg.url))
        .query(&[
            ("org", cfg.org.as_str()),
            ("bucket", cfg.bucket.as_str()),
            ("precision", "ns"),
        ])
        .header("Authorization", format!("Token {}", cfg.token))
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(AppError::Influx(format!(
            "write rejected with status {status}: {detail}"
        )));
    }
    Ok(())
}

/// One reading as an InfluxDB line protocol record:
/// `<measurement>,device=<id> value=<kw> <ns-timestamp>`
fn line_protocol(measurement: &str, reading: &Reading) -> String {
    format!(
        "{},device={} value={} {}",
        escape_name(measurement),
        escape_name(&reading.device_id),
        reading.power_kw,
        reading.observed_at.timestamp_nanos_opt().unwrap_or_default()
    )
}

// Line protocol reserves commas, spaces and equals in names and tag values
fn escape_name(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ").replace('=', "\\=")
}
