//! Bootstrap/update ingest loop.
//!
//! The cursor walks forward in chunks of at most `MAX_API_LIMIT` bars. Each
//! fetch re-reads up to [`OVERLAP_BARS`] bars before the cursor so the
//! indicator kernels arrive at the cursor fully warmed, but only bars at or
//! after the cursor are persisted. One chunk is one immediate transaction,
//! so a crash resumes cleanly from the last committed chunk.

use std::sync::atomic::Ordering;
use std::time::Instant;

use cv_core::candle::{Candle, IndicatorRow};
use cv_core::indicators::compute_suite;
use cv_core::interval::floor_to_interval;
use cv_store::{self as store, Store};

use crate::source::KlineSource;
use crate::{split_symbol, EngineError, SeriesSpec, ShutdownFlag};

pub use cv_client::MAX_API_LIMIT;

/// Bars re-read before the cursor so kernels arrive at it fully warmed.
pub const OVERLAP_BARS: i64 = 600;

/// Per-series outcome of one ingest run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestOutcome {
    pub candles_written: u64,
    pub indicator_rows_written: u64,
    pub chunks: u32,
}

/// Restricts what a chunk persists. Plain ingest writes candles and
/// indicators for every fetched bar at or after the cursor; repair narrows
/// candle writes to the missing window and pins indicator writes to the
/// padded defect window, so the warm-up prefix of a repair chunk never
/// overwrites healthy rows with nulls.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFilter {
    /// Only persist candles with `open_time` inside this inclusive window.
    pub candle_window: Option<(i64, i64)>,
    /// Skip candle writes entirely (indicator-only repair).
    pub indicators_only: bool,
    /// Persist indicator rows inside this inclusive window for every chunk,
    /// regardless of the cursor.
    pub indicator_window: Option<(i64, i64)>,
}

/// Full historical backfill from the configured start date.
pub async fn bootstrap<S: KlineSource>(
    source: &S,
    db: &mut Store,
    series: &SeriesSpec,
    start_ms: i64,
    now_ms: i64,
    dry_run: bool,
    shutdown: &ShutdownFlag,
) -> Result<IngestOutcome, EngineError> {
    let ms = series.interval.ms();
    let end_closed = floor_to_interval(now_ms, ms) - 1;
    ingest_range(
        source,
        db,
        series,
        start_ms,
        start_ms,
        end_closed,
        dry_run,
        &WriteFilter::default(),
        shutdown,
    )
    .await
}

/// Incremental catch-up: resume from the stored tail, re-reading the
/// overlap so the indicator tail is recomputed under upsert semantics.
pub async fn update<S: KlineSource>(
    source: &S,
    db: &mut Store,
    series: &SeriesSpec,
    cfg_start_ms: i64,
    now_ms: i64,
    dry_run: bool,
    shutdown: &ShutdownFlag,
) -> Result<IngestOutcome, EngineError> {
    let ms = series.interval.ms();
    let start = match db.get_series_id(&series.symbol, series.interval.code())? {
        Some(series_id) => match db.get_max_open_time(series_id)? {
            Some(max_open) => cfg_start_ms.max(max_open - OVERLAP_BARS * ms),
            None => cfg_start_ms,
        },
        None => cfg_start_ms,
    };
    let end_closed = floor_to_interval(now_ms, ms) - 1;
    // The overlap may reach back before the resume cursor, so the first
    // rewritten rows come out of warmed kernels rather than cold ones.
    ingest_range(
        source,
        db,
        series,
        cfg_start_ms,
        start,
        end_closed,
        dry_run,
        &WriteFilter::default(),
        shutdown,
    )
    .await
}

/// Core chunk loop shared by bootstrap, update and repair.
///
/// `overlap_floor_ms` is the hard lower bound for overlap fetches,
/// `start_ms` the cursor origin, `end_closed_ms` the inclusive upper bound
/// in millisecond-timestamp space.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_range<S: KlineSource>(
    source: &S,
    db: &mut Store,
    series: &SeriesSpec,
    overlap_floor_ms: i64,
    start_ms: i64,
    end_closed_ms: i64,
    dry_run: bool,
    filter: &WriteFilter,
    shutdown: &ShutdownFlag,
) -> Result<IngestOutcome, EngineError> {
    let ms = series.interval.ms();
    let interval = series.interval;
    let started = Instant::now();
    let mut outcome = IngestOutcome::default();
    let mut cursor = start_ms;

    while cursor <= end_closed_ms {
        if shutdown.load(Ordering::Relaxed) {
            tracing::warn!(
                symbol = %series.symbol,
                interval = interval.code(),
                "shutdown requested, stopping at chunk boundary"
            );
            return Err(EngineError::Interrupted);
        }

        let fetch_end = end_closed_ms.min(cursor + ms * (MAX_API_LIMIT as i64 - 1));
        let overlap_start = overlap_floor_ms.max(cursor - OVERLAP_BARS * ms);

        let klines = source
            .get_klines(
                &series.symbol,
                interval,
                Some(overlap_start),
                Some(fetch_end),
                MAX_API_LIMIT,
            )
            .await?;

        if klines.is_empty() {
            cursor += ms;
            continue;
        }

        let indicator_rows = compute_suite(&klines);
        let (candle_writes, indicator_writes) =
            select_writes(&klines, &indicator_rows, cursor, filter);
        let advance_bars = klines.iter().filter(|k| k.open_time >= cursor).count() as i64;

        let (symbol, interval_code) = (series.symbol.as_str(), interval.code());
        let (base, quote) = split_symbol(symbol);
        db.tx(dry_run, |conn| {
            // Interning happens inside the chunk transaction so a dry run
            // leaves no trace at all.
            let symbol_id = store::ensure_symbol(conn, symbol, &base, &quote)?;
            let interval_id = store::ensure_interval(conn, interval_code, ms)?;
            let series_id = store::ensure_series(conn, symbol_id, interval_id)?;
            store::upsert_candles(conn, series_id, &candle_writes)?;
            store::upsert_indicators(conn, series_id, &indicator_writes)?;
            Ok(())
        })?;

        outcome.candles_written += candle_writes.len() as u64;
        outcome.indicator_rows_written += indicator_writes.len() as u64;
        outcome.chunks += 1;
        tracing::debug!(
            symbol,
            interval = interval_code,
            cursor,
            candles = candle_writes.len(),
            indicators = indicator_writes.len(),
            "chunk committed"
        );

        cursor += advance_bars.max(1) * ms;
    }

    tracing::info!(
        symbol = %series.symbol,
        interval = interval.code(),
        candles = outcome.candles_written,
        chunks = outcome.chunks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        dry_run,
        "ingest range done"
    );
    Ok(outcome)
}

fn select_writes(
    klines: &[Candle],
    indicator_rows: &[IndicatorRow],
    cursor: i64,
    filter: &WriteFilter,
) -> (Vec<Candle>, Vec<IndicatorRow>) {
    let candle_writes: Vec<Candle> = if filter.indicators_only {
        Vec::new()
    } else {
        klines
            .iter()
            .filter(|k| {
                k.open_time >= cursor
                    && filter
                        .candle_window
                        .map_or(true, |(lo, hi)| k.open_time >= lo && k.open_time <= hi)
            })
            .copied()
            .collect()
    };

    let indicator_writes: Vec<IndicatorRow> = match filter.indicator_window {
        Some((lo, hi)) => indicator_rows
            .iter()
            .filter(|r| r.open_time >= lo && r.open_time <= hi)
            .copied()
            .collect(),
        None => indicator_rows
            .iter()
            .filter(|r| r.open_time >= cursor)
            .copied()
            .collect(),
    };

    (candle_writes, indicator_writes)
}
