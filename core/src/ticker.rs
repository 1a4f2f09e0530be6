//! Ticker metadata (§3, `[ADDED]`): the relational lookup the scheduler's `sync_tickers`
//! step maintains and the Load Job stage (§4.5) joins against to validate identifiers.

use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Ticker {
    pub ticker: String,
    pub lot_size: i32,
    pub board: String,
    pub is_active: bool,
}

/// Upserts a batch of tickers synced from an external market-data collector. Conflicts
/// on `ticker` refresh `lot_size`/`board`/`is_active` in place, matching how the
/// reference collector treats its ticker dictionary as last-writer-wins.
pub async fn upsert_tickers(pool: &PgPool, tickers: &[Ticker]) -> Result<(), sqlx::Error> {
    for ticker in tickers {
        sqlx::query(
            r#"
            INSERT INTO tickers (ticker, lot_size, board, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ticker) DO UPDATE
            SET lot_size = EXCLUDED.lot_size,
                board = EXCLUDED.board,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&ticker.ticker)
        .bind(ticker.lot_size)
        .bind(&ticker.board)
        .bind(ticker.is_active)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Active tickers for the given board, the population the scheduler fans task messages
/// out over.
pub async fn active_tickers(pool: &PgPool, board: &str) -> Result<Vec<Ticker>, sqlx::Error> {
    sqlx::query_as::<_, Ticker>(
        "SELECT ticker, lot_size, board, is_active FROM tickers WHERE board = $1 AND is_active",
    )
    .bind(board)
    .fetch_all(pool)
    .await
}
