//! Surgical repair: close continuity gaps and refill null indicator spans
//! by re-running the ingest loop over padded defect windows.

use serde::Serialize;

use cv_core::interval::floor_to_interval;
use cv_store::{Store, StoreError};

use crate::ingest::{ingest_range, WriteFilter, OVERLAP_BARS};
use crate::source::KlineSource;
use crate::verify::{detect_gaps, detect_null_spans, filter_known_gaps};
use crate::{EngineError, SeriesSpec, ShutdownFlag};

#[derive(Debug, Clone, Serialize)]
pub struct SeriesRepairSummary {
    pub symbol: String,
    pub interval: String,
    pub gaps_repaired: usize,
    pub null_spans_repaired: usize,
    pub gaps_remaining: usize,
    pub null_indicator_rows_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairSummary {
    pub series: Vec<SeriesRepairSummary>,
}

impl RepairSummary {
    pub fn clean(&self) -> bool {
        self.series
            .iter()
            .all(|s| s.gaps_remaining == 0 && s.null_indicator_rows_remaining == 0)
    }
}

/// Repair every configured series. Idempotent: a clean store is left
/// untouched, and a second run after a successful one is a no-op.
pub async fn repair<S: KlineSource>(
    source: &S,
    db: &mut Store,
    series: &[SeriesSpec],
    now_ms: i64,
    shutdown: &ShutdownFlag,
) -> Result<RepairSummary, EngineError> {
    // Unlike verify, repair writes; refuse to touch a corrupt file.
    let integrity = db.integrity_check()?;
    if integrity != "ok" {
        return Err(EngineError::Storage(StoreError::Corrupt(integrity)));
    }

    let mut summaries = Vec::with_capacity(series.len());
    for spec in series {
        summaries.push(repair_series(source, db, spec, now_ms, shutdown).await?);
    }
    Ok(RepairSummary { series: summaries })
}

async fn repair_series<S: KlineSource>(
    source: &S,
    db: &mut Store,
    spec: &SeriesSpec,
    now_ms: i64,
    shutdown: &ShutdownFlag,
) -> Result<SeriesRepairSummary, EngineError> {
    let ms = spec.interval.ms();
    let code = spec.interval.code();
    let end_closed = floor_to_interval(now_ms, ms) - 1;

    let Some(series_id) = db.get_series_id(&spec.symbol, code)? else {
        // Nothing stored yet; bootstrap is the tool for that.
        return Ok(SeriesRepairSummary {
            symbol: spec.symbol.clone(),
            interval: code.to_string(),
            gaps_repaired: 0,
            null_spans_repaired: 0,
            gaps_remaining: 0,
            null_indicator_rows_remaining: 0,
        });
    };

    let known = db.known_gaps(series_id)?;

    // Pass 1: continuity gaps, re-ingested with candle writes confined to
    // the missing window and indicator writes pinned to the padded window.
    let times = db.load_open_times(series_id)?;
    let gaps = filter_known_gaps(detect_gaps(&times, ms), &known);
    for gap in &gaps {
        tracing::info!(
            symbol = %spec.symbol,
            interval = code,
            start_missing = gap.start_missing,
            end_missing = gap.end_missing,
            missing_bars = gap.missing_bars,
            "repairing gap"
        );
        let from = (gap.start_missing - OVERLAP_BARS * ms).max(0);
        let to = (gap.end_missing + OVERLAP_BARS * ms).min(end_closed);
        let filter = WriteFilter {
            candle_window: Some((gap.start_missing, gap.end_missing)),
            indicators_only: false,
            // Recompute indicators through the post-gap pad too; their
            // stored values were produced with the gap in their context.
            indicator_window: Some((gap.start_missing, to)),
        };
        ingest_range(source, db, spec, from, from, to, false, &filter, shutdown).await?;
    }

    // Pass 2: all-null indicator spans past warm-up, indicator rows only.
    let first = db.load_open_times(series_id)?.first().copied();
    let spans = match first {
        Some(first_open) => {
            let rows = db.load_indicator_rows(series_id)?;
            detect_null_spans(&rows, first_open, ms)
        }
        None => Vec::new(),
    };
    for span in &spans {
        tracing::info!(
            symbol = %spec.symbol,
            interval = code,
            span_start = span.start,
            span_end = span.end,
            rows = span.rows,
            "recomputing null indicator span"
        );
        let from = (span.start - OVERLAP_BARS * ms).max(0);
        let to = (span.end + OVERLAP_BARS * ms).min(end_closed);
        let filter = WriteFilter {
            candle_window: None,
            indicators_only: true,
            indicator_window: Some((span.start, to)),
        };
        ingest_range(source, db, spec, from, from, to, false, &filter, shutdown).await?;
    }

    // Post-repair audit.
    let times = db.load_open_times(series_id)?;
    let gaps_remaining = filter_known_gaps(detect_gaps(&times, ms), &known).len();
    let null_rows_remaining = match times.first() {
        Some(&first_open) => {
            let rows = db.load_indicator_rows(series_id)?;
            detect_null_spans(&rows, first_open, ms)
                .iter()
                .map(|s| s.rows)
                .sum()
        }
        None => 0,
    };

    let summary = SeriesRepairSummary {
        symbol: spec.symbol.clone(),
        interval: code.to_string(),
        gaps_repaired: gaps.len(),
        null_spans_repaired: spans.len(),
        gaps_remaining,
        null_indicator_rows_remaining: null_rows_remaining,
    };
    tracing::info!(
        symbol = %spec.symbol,
        interval = code,
        gaps_repaired = summary.gaps_repaired,
        null_spans_repaired = summary.null_spans_repaired,
        gaps_remaining = summary.gaps_remaining,
        null_rows_remaining = summary.null_indicator_rows_remaining,
        "repair pass finished"
    );
    Ok(summary)
}
