//! Best-effort delivery of observed ping paths to the visualization collector.
//!
//! The controller only ever enqueues records with [`TelemetryReporter::report`],
//! which never blocks. A worker task drains the queue and does the HTTP work,
//! retrying a bounded number of times; a second task keeps probing the
//! collector so the availability flag stays fresh without any traffic.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::network::Topology;
use crate::rate_limit::RateLimiter;
use crate::Dpid;

pub const DIRECTION_SRC_TO_DST: &str = "src_to_dst";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Ping,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub src: String,
    pub dst: String,
    /// Milliseconds since the Unix epoch.
    pub time: f64,
    pub ttl: u8,
    /// Source host, traversed switches, destination host.
    pub path: Vec<String>,
    pub direction: String,
}

impl PathRecord {
    pub fn new(
        kind: ReportKind,
        src_host: &str,
        dst_host: &str,
        switch_path: &[Dpid],
        topology: &Topology,
        ttl: u8,
        time_ms: f64,
    ) -> Self {
        let mut path = Vec::with_capacity(switch_path.len() + 2);
        path.push(src_host.to_string());
        path.extend(switch_path.iter().map(|dpid| topology.name_of(*dpid)));
        path.push(dst_host.to_string());

        Self {
            kind,
            src: src_host.to_string(),
            dst: dst_host.to_string(),
            time: time_ms,
            ttl,
            path,
            direction: DIRECTION_SRC_TO_DST.to_string(),
        }
    }
}

pub fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Enqueue side of the telemetry pipeline, owned by the controller.
#[derive(Debug)]
pub struct TelemetryReporter {
    tx: mpsc::Sender<PathRecord>,
    drops: RateLimiter,
}

impl TelemetryReporter {
    pub fn new(tx: mpsc::Sender<PathRecord>) -> Self {
        Self {
            tx,
            drops: RateLimiter::new(Duration::from_secs(5)),
        }
    }

    /// Queues `record` for delivery. A full queue drops the record.
    pub fn report(&mut self, record: PathRecord) -> Result<(), TelemetryError> {
        debug!("Queueing path record {} -> {}: {:?}", record.src, record.dst, record.path);
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                crate::rate_limited!(
                    self.drops,
                    "telemetry_queue_full",
                    log::Level::Warn,
                    "Telemetry queue full, dropping path record"
                );
                Err(TelemetryError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TelemetryError::QueueClosed),
        }
    }
}

/// HTTP client for the collector endpoint plus the cached availability flag.
#[derive(Debug, Clone)]
pub struct Collector {
    client: reqwest::Client,
    url: String,
    available: Arc<AtomicBool>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Collector {
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.collector_url.clone(),
            available: Arc::new(AtomicBool::new(false)),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn set_available(&self, available: bool) {
        let was = self.available.swap(available, Ordering::Relaxed);
        if available && !was {
            info!("Connected to collector at {}", self.url);
        }
    }

    /// HEAD against the collector endpoint; any status below 400 counts as up.
    pub async fn probe(&self) -> bool {
        let up = match self.client.head(&self.url).send().await {
            Ok(response) if response.status().as_u16() < 400 => true,
            Ok(response) => {
                debug!("Collector probe returned HTTP {}", response.status());
                false
            }
            Err(e) => {
                debug!("Collector probe failed: {}", e);
                false
            }
        };
        self.set_available(up);
        up
    }

    pub async fn post(&self, record: &PathRecord) -> Result<(), TelemetryError> {
        let response = self.client.post(&self.url).json(record).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Status(status.as_u16()))
        }
    }

    /// Sleeps `retry_delay` unless `attempt` was the last one.
    async fn pause_before(&self, attempt: u32) {
        if attempt < self.max_retries {
            sleep(self.retry_delay).await;
        }
    }

    /// Delivers one record with up to `max_retries` attempts. Returns whether it got through.
    pub async fn deliver(&self, record: &PathRecord) -> bool {
        for attempt in 1..=self.max_retries {
            if !self.is_available() && !self.probe().await {
                warn!(
                    "Collector not available (attempt {}/{})",
                    attempt, self.max_retries
                );
                self.pause_before(attempt).await;
                continue;
            }

            match self.post(record).await {
                Ok(()) => {
                    debug!("Sent path record to {} (attempt {}/{})", self.url, attempt, self.max_retries);
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Failed to send path record: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                    self.set_available(false);
                    self.pause_before(attempt).await;
                }
            }
        }

        warn!(
            "Dropping path record {} -> {} after {} attempts",
            record.src, record.dst, self.max_retries
        );
        false
    }
}

/// Background tasks backing a [`TelemetryReporter`].
#[derive(Debug)]
pub struct TelemetryService {
    collector: Collector,
    worker: JoinHandle<()>,
    prober: JoinHandle<()>,
}

impl TelemetryService {
    /// Spawns the delivery worker and the availability prober on the current runtime.
    pub fn spawn(config: &TelemetryConfig) -> Result<(TelemetryReporter, Self), TelemetryError> {
        let collector = Collector::new(config)?;
        let (tx, mut rx) = mpsc::channel::<PathRecord>(config.queue_capacity.max(1));

        let worker_collector = collector.clone();
        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                worker_collector.deliver(&record).await;
            }
            debug!("Telemetry worker shutting down");
        });

        let prober_collector = collector.clone();
        let startup_delay = config.startup_delay();
        let probe_interval = config.probe_interval();
        let prober = tokio::spawn(async move {
            info!(
                "Will attempt to connect to collector in {} seconds",
                startup_delay.as_secs()
            );
            sleep(startup_delay).await;
            let mut timer = interval(probe_interval);
            loop {
                timer.tick().await;
                if !prober_collector.probe().await {
                    debug!("Collector still unavailable");
                }
            }
        });

        Ok((TelemetryReporter::new(tx), Self { collector, worker, prober }))
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn shutdown(self) {
        self.prober.abort();
        self.worker.abort();
    }
}
