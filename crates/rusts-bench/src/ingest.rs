//! Backpressure-aware batch ingestion.
//!
//! One batch moves through `Sending -> (Success | Backpressure -> Sleep ->
//! Sending) -> (Done | TimedOut)`. Backpressure is the store telling us it is
//! temporarily overloaded: it is retried with a linearly growing sleep capped
//! at ten times the base interval, until the batch's backoff budget runs out.
//! Any other unsuccessful reply is a hard failure and is not retried here.
//!
//! The budget is checked before each sleep, not during it. A batch can
//! therefore overrun `timeout` by at most one capped sleep (`10 * base`) plus
//! the send that follows it.

use crate::collector::{Collector, WRITE_LABEL};
use crate::transport::{Response, Transport, TransportError};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Sleep growth stops at this multiple of the base interval.
pub const BACKOFF_CAP_MULTIPLE: u32 = 10;

/// Known overload messages, matched case-sensitively against the reply body.
pub const DEFAULT_BACKPRESSURE_PATTERNS: &[&str] = &[
    "engine: cache maximum memory size exceeded",
    "write failed: hinted handoff queue not empty",
    "write failed: read message type: read tcp",
    "too many connections",
    "timeout",
];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Server returned error: {status} - {body}")]
    Failure { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("gave up after {backoffs} backoffs ({backoff_time:?} spent backing off)")]
    BackoffTimedOut {
        backoffs: u32,
        backoff_time: Duration,
    },

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// How a reply is treated by the ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Backpressure,
    Failure,
}

/// Recognizes the store's overload replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureDetector {
    /// Status code that overload replies carry
    pub status: u16,
    /// Body substrings that mark an overload reply
    pub patterns: Vec<String>,
}

impl Default for BackpressureDetector {
    fn default() -> Self {
        Self {
            status: 500,
            patterns: DEFAULT_BACKPRESSURE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl BackpressureDetector {
    pub fn classify(&self, response: &Response) -> Classification {
        if response.is_success() {
            Classification::Success
        } else if response.status == self.status
            && self.patterns.iter().any(|p| response.body.contains(p.as_str()))
        {
            Classification::Backpressure
        } else {
            Classification::Failure
        }
    }
}

/// Retry pacing for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First sleep, and the step each further sleep grows by
    #[serde(with = "millis")]
    pub base: Duration,
    /// Wall-clock budget for retrying one batch; may be overrun by one
    /// capped sleep and one send
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Linear backoff: `base, 2*base, ..., 10*base, 10*base, ...`
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            cap: base * BACKOFF_CAP_MULTIPLE,
            current: base,
        }
    }

    /// The sleep to take now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + self.base).min(self.cap);
        delay
    }
}

/// Gzip settings for write bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Compression level (0-9)
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: 6,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.level > 9 {
            return Err(format!(
                "Invalid compression level: {} (max: 9)",
                self.level
            ));
        }
        Ok(())
    }
}

/// Gzip `data` at the given level.
pub fn gzip(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Outcome of a batch that made it through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Latency of the successful send
    pub latency: Duration,
    /// Time spent sleeping on backpressure
    pub backoff_time: Duration,
    pub backoffs: u32,
    /// Bytes on the wire (after compression)
    pub bytes: usize,
}

/// Drives batches through a transport, absorbing backpressure.
pub struct Ingester<T: ?Sized> {
    transport: Arc<T>,
    collector: Arc<Collector>,
    detector: BackpressureDetector,
    backoff: BackoffConfig,
    compression: CompressionConfig,
}

impl<T: Transport + ?Sized> Ingester<T> {
    pub fn new(
        transport: Arc<T>,
        collector: Arc<Collector>,
        detector: BackpressureDetector,
        backoff: BackoffConfig,
        compression: CompressionConfig,
    ) -> Self {
        Self {
            transport,
            collector,
            detector,
            backoff,
            compression,
        }
    }

    /// Send one serialized batch, retrying on backpressure.
    ///
    /// Success and hard failure are both recorded in the collector under
    /// the `write` label; backpressure replies are not.
    pub async fn write_batch(&self, batch: &[u8]) -> Result<BatchReport, IngestError> {
        let body = if self.compression.enabled {
            Bytes::from(gzip(batch, self.compression.level)?)
        } else {
            Bytes::copy_from_slice(batch)
        };

        let started = Instant::now();
        let mut backoff = Backoff::new(self.backoff.base);
        let mut backoffs = 0u32;
        let mut backoff_time = Duration::ZERO;

        loop {
            let sent = Instant::now();
            let result = self
                .transport
                .write(body.clone(), self.compression.enabled)
                .await;
            let latency = sent.elapsed();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    self.collector.add_sample(WRITE_LABEL, latency, false);
                    return Err(e.into());
                }
            };

            match self.detector.classify(&response) {
                Classification::Success => {
                    self.collector.add_sample(WRITE_LABEL, latency, true);
                    return Ok(BatchReport {
                        latency,
                        backoff_time,
                        backoffs,
                        bytes: body.len(),
                    });
                }
                Classification::Failure => {
                    self.collector.add_sample(WRITE_LABEL, latency, false);
                    return Err(IngestError::Failure {
                        status: response.status,
                        body: response.body,
                    });
                }
                Classification::Backpressure => {
                    if started.elapsed() > self.backoff.timeout {
                        warn!(backoffs, ?backoff_time, "backoff budget exhausted, dropping batch");
                        self.collector.add_sample(WRITE_LABEL, latency, false);
                        return Err(IngestError::BackoffTimedOut {
                            backoffs,
                            backoff_time,
                        });
                    }
                    let delay = backoff.next_delay();
                    debug!(status = response.status, ?delay, "backpressure, backing off");
                    tokio::time::sleep(delay).await;
                    backoffs += 1;
                    backoff_time += delay;
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::Read;

    /// Replays a scripted list of replies; repeats the last one when exhausted.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Response>>,
        last: Response,
        bodies: Mutex<Vec<(Bytes, bool)>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Response>) -> Arc<Self> {
            let last = replies.last().cloned().unwrap();
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                last,
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.bodies.lock().len()
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn write(&self, body: Bytes, gzip: bool) -> Result<Response, TransportError> {
            self.bodies.lock().push((body, gzip));
            Ok(self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.last.clone()))
        }

        async fn query(&self, _sql: &str) -> Result<Response, TransportError> {
            Ok(Response::new(200, ""))
        }
    }

    fn ingester(
        transport: Arc<ScriptedTransport>,
        base_ms: u64,
        timeout_ms: u64,
    ) -> (Ingester<ScriptedTransport>, Arc<Collector>) {
        let collector = Arc::new(Collector::new());
        let ingester = Ingester::new(
            transport,
            collector.clone(),
            BackpressureDetector::default(),
            BackoffConfig {
                base: Duration::from_millis(base_ms),
                timeout: Duration::from_millis(timeout_ms),
            },
            CompressionConfig::default(),
        );
        (ingester, collector)
    }

    fn overloaded() -> Response {
        Response::new(500, "write failed: hinted handoff queue not empty")
    }

    #[test]
    fn test_classify() {
        let d = BackpressureDetector::default();
        assert_eq!(d.classify(&Response::new(204, "")), Classification::Success);
        assert_eq!(d.classify(&overloaded()), Classification::Backpressure);
        assert_eq!(
            d.classify(&Response::new(500, "engine: cache maximum memory size exceeded")),
            Classification::Backpressure
        );
        assert_eq!(
            d.classify(&Response::new(500, "malformed query")),
            Classification::Failure
        );
        // Right text, wrong status.
        assert_eq!(
            d.classify(&Response::new(400, "timeout")),
            Classification::Failure
        );
        // Matching is case-sensitive.
        assert_eq!(
            d.classify(&Response::new(500, "TIMEOUT")),
            Classification::Failure
        );
    }

    #[test]
    fn test_backoff_grows_linearly_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(100));
        let delays: Vec<u64> = (0..13).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(
            delays,
            vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000, 1000, 1000, 1000]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let transport = ScriptedTransport::new(vec![Response::new(204, "")]);
        let (ingester, collector) = ingester(transport.clone(), 10, 1000);

        let report = ingester.write_batch(b"cpu v=1i 1\n").await.unwrap();
        assert_eq!(report.backoffs, 0);
        assert_eq!(report.bytes, 11);
        assert_eq!(transport.calls(), 1);

        let r = collector.detail().unwrap();
        assert_eq!((r.total, r.fail), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backpressure_is_retried_not_failed() {
        let transport = ScriptedTransport::new(vec![
            overloaded(),
            overloaded(),
            Response::new(204, ""),
        ]);
        let (ingester, collector) = ingester(transport.clone(), 10, 1000);

        let report = ingester.write_batch(b"cpu v=1i 1\n").await.unwrap();
        assert_eq!(report.backoffs, 2);
        assert_eq!(report.backoff_time, Duration::from_millis(30));
        assert_eq!(transport.calls(), 3);

        // The same batch is resent each time.
        let bodies = transport.bodies.lock();
        assert!(bodies.iter().all(|(b, _)| b.as_ref() == b"cpu v=1i 1\n"));

        let r = collector.detail().unwrap();
        assert_eq!((r.total, r.fail), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_failure_not_retried() {
        let transport = ScriptedTransport::new(vec![Response::new(500, "malformed query")]);
        let (ingester, collector) = ingester(transport.clone(), 10, 1000);

        let err = ingester.write_batch(b"x").await.unwrap_err();
        assert!(matches!(err, IngestError::Failure { status: 500, .. }));
        assert_eq!(transport.calls(), 1);

        let r = collector.detail().unwrap();
        assert_eq!((r.total, r.fail), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_budget_exhausted() {
        let transport = ScriptedTransport::new(vec![overloaded()]);
        let (ingester, collector) = ingester(transport.clone(), 10, 90);

        let err = ingester.write_batch(b"x").await.unwrap_err();
        match err {
            IngestError::BackoffTimedOut {
                backoffs,
                backoff_time,
            } => {
                // Sends at 0, 10, 30 and 60ms are within budget; the one at 100ms is not.
                assert_eq!(backoffs, 4);
                assert_eq!(backoff_time, Duration::from_millis(100));
                assert!(backoff_time > Duration::from_millis(90));
                // Overrun is bounded by one capped sleep.
                assert!(backoff_time <= Duration::from_millis(90 + 10 * 10));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.calls(), 5);

        let r = collector.detail().unwrap();
        assert_eq!((r.total, r.fail), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_never_exceeds_cap() {
        let transport = ScriptedTransport::new(vec![overloaded()]);
        let (ingester, _) = ingester(transport, 1, 200);

        let err = ingester.write_batch(b"x").await.unwrap_err();
        let IngestError::BackoffTimedOut {
            backoffs,
            backoff_time,
        } = err
        else {
            panic!("expected timeout");
        };
        // Sleeps 1..=10ms then 10ms each; never more than 10ms per step.
        assert!(backoff_time <= Duration::from_millis(10) * backoffs);
        assert!(backoffs > 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compressed_body_is_gzip() {
        let transport = ScriptedTransport::new(vec![Response::new(204, "")]);
        let collector = Arc::new(Collector::new());
        let ingester = Ingester::new(
            transport.clone(),
            collector,
            BackpressureDetector::default(),
            BackoffConfig::default(),
            CompressionConfig {
                enabled: true,
                level: 6,
            },
        );

        let batch = b"cpu,host=a v=1i 1\n".repeat(100);
        let report = ingester.write_batch(&batch).await.unwrap();
        assert!(report.bytes < batch.len());

        let bodies = transport.bodies.lock();
        let (body, gzipped) = &bodies[0];
        assert!(*gzipped);
        let mut decoded = Vec::new();
        GzDecoder::new(body.as_ref()).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_compression_level_validation() {
        assert!(CompressionConfig::default().validate().is_ok());
        let bad = CompressionConfig {
            enabled: true,
            level: 12,
        };
        assert!(bad.validate().is_err());
    }
}
