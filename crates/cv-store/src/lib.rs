//! SQLite persistence for candles and their indicator companions.
//!
//! The store owns the schema and all write paths. Upserts are full-row
//! overwrites keyed on `(series_id, open_time)`, so re-ingesting identical
//! data leaves the file bit-identical. All multi-row writes run inside
//! immediate-mode transactions created by [`Store::tx`].

mod error;

pub use error::StoreError;

use rusqlite::{params, Connection, OpenFlags, TransactionBehavior};
use serde::Serialize;
use std::path::Path;

use cv_core::candle::{Candle, IndicatorRow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS symbols (
    id          INTEGER PRIMARY KEY,
    symbol      TEXT NOT NULL UNIQUE,
    base_asset  TEXT NOT NULL,
    quote_asset TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS intervals (
    id   INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    ms   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS series (
    id          INTEGER PRIMARY KEY,
    symbol_id   INTEGER NOT NULL REFERENCES symbols(id),
    interval_id INTEGER NOT NULL REFERENCES intervals(id),
    UNIQUE (symbol_id, interval_id)
);

CREATE TABLE IF NOT EXISTS candles (
    series_id              INTEGER NOT NULL REFERENCES series(id),
    open_time              INTEGER NOT NULL,
    open                   REAL NOT NULL,
    high                   REAL NOT NULL,
    low                    REAL NOT NULL,
    close                  REAL NOT NULL,
    volume                 REAL NOT NULL,
    quote_asset_volume     REAL NOT NULL,
    trades                 INTEGER NOT NULL,
    taker_buy_base_volume  REAL NOT NULL,
    taker_buy_quote_volume REAL NOT NULL,
    PRIMARY KEY (series_id, open_time)
);

CREATE TABLE IF NOT EXISTS indicators (
    series_id    INTEGER NOT NULL REFERENCES series(id),
    open_time    INTEGER NOT NULL,
    ema50        REAL,
    ema200       REAL,
    rsi14        REAL,
    atr14        REAL,
    adx14        REAL,
    vol_ma20     REAL,
    macd         REAL,
    macd_signal  REAL,
    macd_hist    REAL,
    bb_sma20     REAL,
    bb_upper     REAL,
    bb_lower     REAL,
    pct_return_1 REAL,
    log_return_1 REAL,
    PRIMARY KEY (series_id, open_time)
);

CREATE TABLE IF NOT EXISTS series_state (
    series_id       INTEGER PRIMARY KEY REFERENCES series(id),
    last_open_time  INTEGER,
    last_updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS known_gaps (
    series_id       INTEGER NOT NULL REFERENCES series(id),
    start_open_time INTEGER NOT NULL,
    end_open_time   INTEGER NOT NULL,
    PRIMARY KEY (series_id, start_open_time)
);

CREATE INDEX IF NOT EXISTS idx_candles_series_time
    ON candles (series_id, open_time);
CREATE INDEX IF NOT EXISTS idx_indicators_series_time
    ON indicators (series_id, open_time);
";

/// Denormalised candle × indicator row for the query surface.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRow {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_asset_volume: f64,
    pub trades: i64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub adx14: Option<f64>,
    pub vol_ma20: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_sma20: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub pct_return_1: Option<f64>,
    pub log_return_1: Option<f64>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the
    /// schema and durability pragmas.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside an immediate-mode transaction. Commits on success,
    /// rolls back on error, and rolls back unconditionally when `dry_run`.
    pub fn tx<T>(
        &mut self,
        dry_run: bool,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        if dry_run {
            tracing::info!("dry run: rolling back transaction");
            tx.rollback()?;
        } else {
            tx.commit()?;
        }
        Ok(out)
    }

    pub fn ensure_symbol(
        &self,
        symbol: &str,
        base_asset: &str,
        quote_asset: &str,
    ) -> Result<i64, StoreError> {
        ensure_symbol(&self.conn, symbol, base_asset, quote_asset)
    }

    pub fn ensure_interval(&self, code: &str, ms: i64) -> Result<i64, StoreError> {
        ensure_interval(&self.conn, code, ms)
    }

    pub fn ensure_series(&self, symbol_id: i64, interval_id: i64) -> Result<i64, StoreError> {
        ensure_series(&self.conn, symbol_id, interval_id)
    }

    pub fn get_series_id(&self, symbol: &str, code: &str) -> Result<Option<i64>, StoreError> {
        get_series_id(&self.conn, symbol, code)
    }

    pub fn get_max_open_time(&self, series_id: i64) -> Result<Option<i64>, StoreError> {
        get_max_open_time(&self.conn, series_id)
    }

    /// `(min, max)` open time for a series, or `None` when empty.
    pub fn get_time_range(&self, series_id: i64) -> Result<Option<(i64, i64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT MIN(open_time), MAX(open_time) FROM candles WHERE series_id = ?1")?;
        let row = stmt.query_row(params![series_id], |row| {
            let min: Option<i64> = row.get(0)?;
            let max: Option<i64> = row.get(1)?;
            Ok(min.zip(max))
        })?;
        Ok(row)
    }

    pub fn count_candles(&self, series_id: i64) -> Result<i64, StoreError> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM candles WHERE series_id = ?1",
            params![series_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// All candle open times for a series, ascending.
    pub fn load_open_times(&self, series_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT open_time FROM candles WHERE series_id = ?1 ORDER BY open_time ASC",
        )?;
        let times = stmt
            .query_map(params![series_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(times)
    }

    /// All indicator rows for a series, ascending by open time.
    pub fn load_indicator_rows(&self, series_id: i64) -> Result<Vec<IndicatorRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT open_time, ema50, ema200, rsi14, atr14, adx14, vol_ma20,
                    macd, macd_signal, macd_hist, bb_sma20, bb_upper, bb_lower,
                    pct_return_1, log_return_1
             FROM indicators WHERE series_id = ?1 ORDER BY open_time ASC",
        )?;
        let rows = stmt
            .query_map(params![series_id], |row| {
                Ok(IndicatorRow {
                    open_time: row.get(0)?,
                    ema50: row.get(1)?,
                    ema200: row.get(2)?,
                    rsi14: row.get(3)?,
                    atr14: row.get(4)?,
                    adx14: row.get(5)?,
                    vol_ma20: row.get(6)?,
                    macd: row.get(7)?,
                    macd_signal: row.get(8)?,
                    macd_hist: row.get(9)?,
                    bb_sma20: row.get(10)?,
                    bb_upper: row.get(11)?,
                    bb_lower: row.get(12)?,
                    pct_return_1: row.get(13)?,
                    log_return_1: row.get(14)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Candles loaded ascending over `[from, to]`. The close time is not
    /// persisted; it is reconstructed from `step_ms`.
    pub fn load_candles_range(
        &self,
        series_id: i64,
        from: i64,
        to: i64,
        step_ms: i64,
    ) -> Result<Vec<Candle>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT open_time, open, high, low, close, volume, quote_asset_volume,
                    trades, taker_buy_base_volume, taker_buy_quote_volume
             FROM candles
             WHERE series_id = ?1 AND open_time >= ?2 AND open_time <= ?3
             ORDER BY open_time ASC",
        )?;
        let rows = stmt
            .query_map(params![series_id, from, to], |row| {
                let open_time: i64 = row.get(0)?;
                Ok(Candle {
                    open_time,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    quote_asset_volume: row.get(6)?,
                    trades: row.get(7)?,
                    taker_buy_base_volume: row.get(8)?,
                    taker_buy_quote_volume: row.get(9)?,
                    close_time: open_time + step_ms - 1,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Registered no-data windows for a series, ascending.
    pub fn known_gaps(&self, series_id: i64) -> Result<Vec<(i64, i64)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT start_open_time, end_open_time FROM known_gaps
             WHERE series_id = ?1 ORDER BY start_open_time ASC",
        )?;
        let gaps = stmt
            .query_map(params![series_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(gaps)
    }

    pub fn add_known_gap(&self, series_id: i64, start: i64, end: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO known_gaps (series_id, start_open_time, end_open_time)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (series_id, start_open_time) DO UPDATE SET
                 end_open_time = excluded.end_open_time",
            params![series_id, start, end],
        )?;
        Ok(())
    }

    /// `PRAGMA integrity_check`, reported verbatim.
    pub fn integrity_check(&self) -> Result<String, StoreError> {
        let mut stmt = self.conn.prepare("PRAGMA integrity_check")?;
        let lines = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }

    /// Newest-first denormalised join for the query command.
    pub fn query_rows(
        &self,
        symbol: &str,
        code: &str,
        limit: u32,
    ) -> Result<Vec<QueryRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.open_time, c.open, c.high, c.low, c.close, c.volume,
                    c.quote_asset_volume, c.trades, c.taker_buy_base_volume,
                    c.taker_buy_quote_volume,
                    i.ema50, i.ema200, i.rsi14, i.atr14, i.adx14, i.vol_ma20,
                    i.macd, i.macd_signal, i.macd_hist, i.bb_sma20, i.bb_upper,
                    i.bb_lower, i.pct_return_1, i.log_return_1
             FROM candles c
             JOIN series s ON s.id = c.series_id
             JOIN symbols sym ON sym.id = s.symbol_id
             JOIN intervals iv ON iv.id = s.interval_id
             LEFT JOIN indicators i
                    ON i.series_id = c.series_id AND i.open_time = c.open_time
             WHERE sym.symbol = ?1 AND iv.code = ?2
             ORDER BY c.open_time DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![symbol, code, limit], |row| {
                Ok(QueryRow {
                    symbol: symbol.to_string(),
                    interval: code.to_string(),
                    open_time: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    quote_asset_volume: row.get(6)?,
                    trades: row.get(7)?,
                    taker_buy_base_volume: row.get(8)?,
                    taker_buy_quote_volume: row.get(9)?,
                    ema50: row.get(10)?,
                    ema200: row.get(11)?,
                    rsi14: row.get(12)?,
                    atr14: row.get(13)?,
                    adx14: row.get(14)?,
                    vol_ma20: row.get(15)?,
                    macd: row.get(16)?,
                    macd_signal: row.get(17)?,
                    macd_hist: row.get(18)?,
                    bb_sma20: row.get(19)?,
                    bb_upper: row.get(20)?,
                    bb_lower: row.get(21)?,
                    pct_return_1: row.get(22)?,
                    log_return_1: row.get(23)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Connection-level operations, usable inside Store::tx closures.
// ---------------------------------------------------------------------------

pub fn ensure_symbol(
    conn: &Connection,
    symbol: &str,
    base_asset: &str,
    quote_asset: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO symbols (symbol, base_asset, quote_asset) VALUES (?1, ?2, ?3)
         ON CONFLICT (symbol) DO UPDATE SET
             base_asset = excluded.base_asset,
             quote_asset = excluded.quote_asset",
        params![symbol, base_asset, quote_asset],
    )?;
    let id = conn.query_row(
        "SELECT id FROM symbols WHERE symbol = ?1",
        params![symbol],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_interval(conn: &Connection, code: &str, ms: i64) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO intervals (code, ms) VALUES (?1, ?2)
         ON CONFLICT (code) DO UPDATE SET ms = excluded.ms",
        params![code, ms],
    )?;
    let id = conn.query_row(
        "SELECT id FROM intervals WHERE code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_series(
    conn: &Connection,
    symbol_id: i64,
    interval_id: i64,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO series (symbol_id, interval_id) VALUES (?1, ?2)",
        params![symbol_id, interval_id],
    )?;
    let id = conn.query_row(
        "SELECT id FROM series WHERE symbol_id = ?1 AND interval_id = ?2",
        params![symbol_id, interval_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_series_id(
    conn: &Connection,
    symbol: &str,
    code: &str,
) -> Result<Option<i64>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT s.id FROM series s
         JOIN symbols sym ON sym.id = s.symbol_id
         JOIN intervals iv ON iv.id = s.interval_id
         WHERE sym.symbol = ?1 AND iv.code = ?2",
    )?;
    match stmt.query_row(params![symbol, code], |row| row.get(0)) {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_max_open_time(conn: &Connection, series_id: i64) -> Result<Option<i64>, StoreError> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(open_time) FROM candles WHERE series_id = ?1",
        params![series_id],
        |row| row.get(0),
    )?;
    Ok(max)
}

/// Full-row overwrite upsert, idempotent on `(series_id, open_time)`.
pub fn upsert_candles(
    conn: &Connection,
    series_id: i64,
    rows: &[Candle],
) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO candles (series_id, open_time, open, high, low, close, volume,
                              quote_asset_volume, trades, taker_buy_base_volume,
                              taker_buy_quote_volume)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT (series_id, open_time) DO UPDATE SET
             open = excluded.open,
             high = excluded.high,
             low = excluded.low,
             close = excluded.close,
             volume = excluded.volume,
             quote_asset_volume = excluded.quote_asset_volume,
             trades = excluded.trades,
             taker_buy_base_volume = excluded.taker_buy_base_volume,
             taker_buy_quote_volume = excluded.taker_buy_quote_volume",
    )?;
    for c in rows {
        stmt.execute(params![
            series_id,
            c.open_time,
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
            c.quote_asset_volume,
            c.trades,
            c.taker_buy_base_volume,
            c.taker_buy_quote_volume,
        ])?;
    }
    Ok(rows.len())
}

pub fn upsert_indicators(
    conn: &Connection,
    series_id: i64,
    rows: &[IndicatorRow],
) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO indicators (series_id, open_time, ema50, ema200, rsi14, atr14,
                                 adx14, vol_ma20, macd, macd_signal, macd_hist,
                                 bb_sma20, bb_upper, bb_lower, pct_return_1,
                                 log_return_1)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT (series_id, open_time) DO UPDATE SET
             ema50 = excluded.ema50,
             ema200 = excluded.ema200,
             rsi14 = excluded.rsi14,
             atr14 = excluded.atr14,
             adx14 = excluded.adx14,
             vol_ma20 = excluded.vol_ma20,
             macd = excluded.macd,
             macd_signal = excluded.macd_signal,
             macd_hist = excluded.macd_hist,
             bb_sma20 = excluded.bb_sma20,
             bb_upper = excluded.bb_upper,
             bb_lower = excluded.bb_lower,
             pct_return_1 = excluded.pct_return_1,
             log_return_1 = excluded.log_return_1",
    )?;
    for r in rows {
        stmt.execute(params![
            series_id,
            r.open_time,
            r.ema50,
            r.ema200,
            r.rsi14,
            r.atr14,
            r.adx14,
            r.vol_ma20,
            r.macd,
            r.macd_signal,
            r.macd_hist,
            r.bb_sma20,
            r.bb_upper,
            r.bb_lower,
            r.pct_return_1,
            r.log_return_1,
        ])?;
    }
    Ok(rows.len())
}

/// Delete candles and indicator rows with `open_time ∈ [from, to]`.
pub fn delete_range(
    conn: &Connection,
    series_id: i64,
    from: i64,
    to: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM candles WHERE series_id = ?1 AND open_time >= ?2 AND open_time <= ?3",
        params![series_id, from, to],
    )?;
    conn.execute(
        "DELETE FROM indicators WHERE series_id = ?1 AND open_time >= ?2 AND open_time <= ?3",
        params![series_id, from, to],
    )?;
    Ok(())
}
