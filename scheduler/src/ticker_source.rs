//! Ticker-dictionary sync is owned by an external market-data collector (out of scope
//! per the base spec's Non-goals). `TickerSource` is the trait boundary `sync_tickers`
//! calls through; `NoopTickerSource` is the placeholder standing in for that
//! collaborator, mirroring `backtest_core::kernel::PlaceholderKernel`'s role for
//! out-of-scope indicator math.

use async_trait::async_trait;
use backtest_core::ticker::Ticker;

use crate::error::SchedulerError;

#[async_trait]
pub trait TickerSource: Send + Sync {
    async fn fetch_active_tickers(&self, board: &str) -> Result<Vec<Ticker>, SchedulerError>;
}

pub struct NoopTickerSource;

#[async_trait]
impl TickerSource for NoopTickerSource {
    async fn fetch_active_tickers(&self, _board: &str) -> Result<Vec<Ticker>, SchedulerError> {
        tracing::warn!(
            "ticker sync requested but no market-data collector is wired in; skipping"
        );
        Ok(Vec::new())
    }
}
