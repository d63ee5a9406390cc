//! Load generator and benchmark harness for line-protocol time series stores.
//!
//! A [`Simulator`] deterministically produces points for one of several
//! use cases (vehicles, air-quality sites, devops hosts, generic devices)
//! and renders query templates against the same entities. Write workers
//! batch those points into InfluxDB line protocol and push them through an
//! [`Ingester`], which absorbs the store's backpressure. Query workers time
//! the rendered queries. Every request lands in a [`Collector`], which is
//! summarized into a [`Report`] at the end of the run.
//!
//! # Usage
//! ```bash
//! # Write the whole dataset
//! rusts-bench write --use-case devops --entities 100 --workers 8
//!
//! # Query-only, 1000 queries
//! rusts-bench query --config bench.yaml --limit 1000
//!
//! # Combined benchmark for five minutes
//! rusts-bench benchmark --config bench.yaml --duration 300 --output report
//! ```

pub mod collector;
pub mod config;
pub mod entity;
pub mod ingest;
pub mod report;
pub mod serializer;
pub mod simulator;
pub mod template;
pub mod transport;
pub mod workload;

pub use collector::{Collector, RespTimeResult, StatsError};
pub use config::{Config, ConfigError, QueryConfig, SimulationConfig, WorkloadMode, WriteConfig};
pub use entity::{Entity, UseCase};
pub use ingest::{BackoffConfig, BackpressureDetector, CompressionConfig, IngestError, Ingester};
pub use report::Report;
pub use serializer::{LineProtocol, Serializer};
pub use simulator::{Simulator, SimulatorConfig, SimulatorError};
pub use template::{SqlTemplate, TemplateError};
pub use transport::{HttpTransport, QueryApi, Response, Transport, TransportError};
pub use workload::{run_workload, WorkloadError};
