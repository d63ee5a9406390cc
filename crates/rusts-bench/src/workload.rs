//! Combined workload orchestration.

use crate::collector::{Collector, StatsError, READ_LABEL};
use crate::config::{Config, ConfigError, WorkloadMode};
use crate::ingest::{BatchReport, Ingester};
use crate::report::Report;
use crate::serializer::{LineProtocol, Serializer};
use crate::simulator::{Simulator, SimulatorError};
use crate::transport::Transport;
use rusts_bench_core::{Point, Pool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant as WallClock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulator(#[from] SimulatorError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Counters for the write side that the collector does not track.
#[derive(Debug, Default)]
pub struct WriteStats {
    pub points: AtomicU64,
    pub values: AtomicU64,
    pub batches: AtomicU64,
    pub bytes: AtomicU64,
    pub backoffs: AtomicU64,
    pub errors: AtomicU64,
}

impl WriteStats {
    fn record(&self, points: u64, values: u64, batch: &BatchReport) {
        self.points.fetch_add(points, Ordering::Relaxed);
        self.values.fetch_add(values, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(batch.bytes as u64, Ordering::Relaxed);
        self.backoffs
            .fetch_add(u64::from(batch.backoffs), Ordering::Relaxed);
    }
}

/// Runs the complete workload based on configuration.
pub async fn run_workload(
    config: &Config,
    mode: WorkloadMode,
    transport: Arc<dyn Transport>,
) -> Result<Report, WorkloadError> {
    config.validate(mode)?;
    let simulator = Arc::new(Simulator::new(config.simulator_config()?)?);

    info!("Starting workload in {} mode", mode);
    info!(
        "Configuration: {} {} entities, {} points to write, {:?} limit",
        simulator.entity_count(),
        simulator.use_case(),
        simulator.total(),
        config.duration()
    );

    let collector = Arc::new(Collector::new());
    let stats = Arc::new(WriteStats::default());
    let deadline = config.duration().map(|d| Instant::now() + d);

    let write_workers = if mode.writes() { config.write.workers } else { 0 };
    let query_workers = if mode.queries() { config.query.workers } else { 0 };

    let points = Arc::new(Pool::<Point>::with_capacity(write_workers));
    let buffers = Arc::new(Pool::<Vec<u8>>::with_capacity(write_workers));
    let ingester = Arc::new(Ingester::new(
        transport.clone(),
        collector.clone(),
        config.write.backpressure.clone(),
        config.write.backoff,
        config.write.compression,
    ));

    let started = WallClock::now();
    collector.set_start(started);

    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(write_workers + query_workers);
    for worker in 0..write_workers {
        let ctx = WriteWorker {
            id: worker,
            simulator: simulator.clone(),
            ingester: ingester.clone(),
            points: points.clone(),
            buffers: buffers.clone(),
            batch_size: config.write.batch_size,
            deadline,
            stats: stats.clone(),
        };
        handles.push(tokio::spawn(ctx.run()));
    }
    for worker in 0..query_workers {
        let ctx = QueryWorker {
            id: worker,
            simulator: simulator.clone(),
            transport: transport.clone(),
            collector: collector.clone(),
            limit: config.query.limit,
            deadline,
            follow_writes: mode == WorkloadMode::Benchmark,
        };
        handles.push(tokio::spawn(ctx.run()));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    collector.set_end(WallClock::now());
    let elapsed = started.elapsed();
    info!("Workload completed in {:.1}s", elapsed.as_secs_f64());

    let results = collector.group_detail()?;
    let overall = collector.detail()?;
    let queries = results.get(READ_LABEL).map_or(0, |r| r.total as u64);

    Ok(Report {
        mode,
        use_case: simulator.use_case(),
        entities: simulator.entity_count(),
        workers: write_workers,
        query_workers,
        duration: elapsed,
        points: stats.points.load(Ordering::Relaxed),
        values: stats.values.load(Ordering::Relaxed),
        batches: stats.batches.load(Ordering::Relaxed),
        bytes: stats.bytes.load(Ordering::Relaxed),
        backoffs: stats.backoffs.load(Ordering::Relaxed),
        write_errors: stats.errors.load(Ordering::Relaxed),
        queries,
        results,
        overall,
    })
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

struct WriteWorker {
    id: usize,
    simulator: Arc<Simulator>,
    ingester: Arc<Ingester<dyn Transport>>,
    points: Arc<Pool<Point>>,
    buffers: Arc<Pool<Vec<u8>>>,
    batch_size: usize,
    deadline: Option<Instant>,
    stats: Arc<WriteStats>,
}

impl WriteWorker {
    /// Generate, serialize and send batches until the dataset or the clock
    /// runs out.
    async fn run(self) {
        let serializer = LineProtocol;
        let mut point = self.points.acquire();
        let mut buf = self.buffers.acquire();

        loop {
            if expired(self.deadline) {
                debug!(worker = self.id, "write deadline reached");
                break;
            }

            buf.clear();
            let mut count = 0u64;
            let mut values = 0u64;
            let mut highest = 0u64;
            let mut exhausted = false;

            while count < self.batch_size as u64 {
                let number = self.simulator.next(&mut point);
                if !self.simulator.accepts(number) {
                    exhausted = true;
                    break;
                }
                if let Err(e) = serializer.serialize(&point, &mut buf) {
                    warn!(worker = self.id, number, "Skipping point: {}", e);
                    continue;
                }
                count += 1;
                values += point.field_count() as u64;
                highest = highest.max(number);
            }

            if count > 0 {
                match self.ingester.write_batch(&buf).await {
                    Ok(batch) => {
                        self.simulator.set_written_points(highest);
                        self.stats.record(count, values, &batch);
                    }
                    Err(e) => {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        warn!(worker = self.id, points = count, "Write error: {}", e);
                    }
                }
            }

            if exhausted {
                debug!(worker = self.id, "dataset exhausted");
                break;
            }
        }
    }
}

struct QueryWorker {
    id: usize,
    simulator: Arc<Simulator>,
    transport: Arc<dyn Transport>,
    collector: Arc<Collector>,
    limit: u64,
    deadline: Option<Instant>,
    /// Without a limit, stop once the writers have drained the dataset.
    follow_writes: bool,
}

impl QueryWorker {
    async fn run(self) {
        let mut sql = String::new();

        loop {
            if expired(self.deadline) {
                debug!(worker = self.id, "query deadline reached");
                break;
            }
            if self.limit == 0 && self.follow_writes && self.simulator.finished() {
                break;
            }

            sql.clear();
            let number = self.simulator.next_sql(&mut sql);
            if number == 0 || (self.limit > 0 && number > self.limit) {
                break;
            }

            let sent = Instant::now();
            let result = self.transport.query(&sql).await;
            let latency = sent.elapsed();

            let success = match result {
                Ok(response) if response.is_success() => true,
                Ok(response) => {
                    debug!(worker = self.id, status = response.status, %sql, "query rejected");
                    false
                }
                Err(e) => {
                    warn!(worker = self.id, "Query error: {}", e);
                    false
                }
            };
            self.collector.add_sample(READ_LABEL, latency, success);
        }
    }
}
