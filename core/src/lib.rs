//! Domain core for the backtest processing service: the strategy AST, indicator
//! registry, strategy analyser, indicator resolver, job/batch persistence, and the
//! six-stage pipeline that ties them together. Transport (Kafka) and storage (Postgres,
//! ClickHouse, Redis) adapters live in the `common-*` crates this depends on; the
//! `indicator-worker`, `backtest-orchestrator`, and `scheduler` binaries wire this crate
//! to those adapters and to `lifecycle::Manager`.

pub mod analyser;
pub mod ast;
pub mod error;
pub mod job;
pub mod kernel;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod ticker;
pub mod trade;

pub use error::StageError;
pub use pipeline::{run_pipeline, CalcRequestPublisher, PipelineContext, PipelineDeps};
