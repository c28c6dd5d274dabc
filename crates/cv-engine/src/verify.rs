//! Read-only integrity report: series continuity and indicator coverage.

use serde::Serialize;

use cv_core::candle::IndicatorRow;
use cv_core::indicators::WARMUP_BARS;
use cv_store::{Store, StoreError};

use crate::SeriesSpec;

/// Samples included per defect class in a report.
const MAX_SAMPLES: usize = 5;

/// A run of missing bars between two stored candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub start_missing: i64,
    pub end_missing: i64,
    pub missing_bars: i64,
}

/// A contiguous run of indicator rows where every field is null, past the
/// warm-up region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NullSpan {
    pub start: i64,
    pub end: i64,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapSample {
    pub start_missing: i64,
    pub end_missing: i64,
    pub missing_bars: i64,
    pub approx_duration: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NullSpanSample {
    pub start: i64,
    pub end: i64,
    pub rows: i64,
    pub approx_duration: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub symbol: String,
    pub interval: String,
    pub series_empty: bool,
    pub first_open_time: Option<i64>,
    pub last_open_time: Option<i64>,
    pub candle_count: i64,
    pub gap_count: usize,
    pub gap_samples: Vec<GapSample>,
    pub null_span_count: usize,
    pub null_span_samples: Vec<NullSpanSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub integrity: String,
    pub series: Vec<SeriesReport>,
}

impl VerifyReport {
    /// True when the store is structurally sound and every series is
    /// continuous with full indicator coverage.
    pub fn clean(&self) -> bool {
        self.integrity == "ok"
            && self
                .series
                .iter()
                .all(|s| s.gap_count == 0 && s.null_span_count == 0)
    }
}

/// Gaps between consecutive stored open times; `ms` apart means continuous.
pub fn detect_gaps(times: &[i64], ms: i64) -> Vec<Gap> {
    let mut gaps = Vec::new();
    for pair in times.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next - prev > ms {
            gaps.push(Gap {
                start_missing: prev + ms,
                end_missing: next - ms,
                missing_bars: (next - prev) / ms - 1,
            });
        }
    }
    gaps
}

/// Drop gaps fully covered by a registered known-gap window.
pub fn filter_known_gaps(gaps: Vec<Gap>, known: &[(i64, i64)]) -> Vec<Gap> {
    gaps.into_iter()
        .filter(|g| {
            !known
                .iter()
                .any(|&(start, end)| start <= g.start_missing && g.end_missing <= end)
        })
        .collect()
}

/// All-null indicator rows past the warm-up region, merged into spans when
/// contiguous by `ms`.
pub fn detect_null_spans(rows: &[IndicatorRow], first_open: i64, ms: i64) -> Vec<NullSpan> {
    let warmup_end = first_open + WARMUP_BARS as i64 * ms;
    let mut spans: Vec<NullSpan> = Vec::new();
    for row in rows {
        if row.open_time <= warmup_end || !row.is_all_null() {
            continue;
        }
        match spans.last_mut() {
            Some(span) if row.open_time == span.end + ms => {
                span.end = row.open_time;
                span.rows += 1;
            }
            _ => spans.push(NullSpan {
                start: row.open_time,
                end: row.open_time,
                rows: 1,
            }),
        }
    }
    spans
}

/// Human-readable approximate duration for report samples.
pub fn format_approx_duration(duration_ms: i64) -> String {
    let secs = duration_ms / 1_000;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3_600)
    }
}

/// Build the full read-only report for the configured series.
pub fn verify(db: &Store, series: &[SeriesSpec]) -> Result<VerifyReport, StoreError> {
    let integrity = db.integrity_check()?;
    let mut reports = Vec::with_capacity(series.len());

    for spec in series {
        reports.push(verify_series(db, spec)?);
    }

    Ok(VerifyReport {
        integrity,
        series: reports,
    })
}

fn verify_series(db: &Store, spec: &SeriesSpec) -> Result<SeriesReport, StoreError> {
    let ms = spec.interval.ms();
    let code = spec.interval.code().to_string();

    let Some(series_id) = db.get_series_id(&spec.symbol, &code)? else {
        return Ok(empty_report(spec, code));
    };

    let times = db.load_open_times(series_id)?;
    if times.is_empty() {
        return Ok(empty_report(spec, code));
    }
    let first = times[0];
    let last = *times.last().expect("non-empty");

    let known = db.known_gaps(series_id)?;
    let gaps = filter_known_gaps(detect_gaps(&times, ms), &known);

    let indicator_rows = db.load_indicator_rows(series_id)?;
    let spans = detect_null_spans(&indicator_rows, first, ms);

    let gap_samples = gaps
        .iter()
        .take(MAX_SAMPLES)
        .map(|g| GapSample {
            start_missing: g.start_missing,
            end_missing: g.end_missing,
            missing_bars: g.missing_bars,
            approx_duration: format_approx_duration(g.missing_bars * ms),
        })
        .collect();
    let null_span_samples = spans
        .iter()
        .take(MAX_SAMPLES)
        .map(|s| NullSpanSample {
            start: s.start,
            end: s.end,
            rows: s.rows,
            approx_duration: format_approx_duration(s.rows * ms),
        })
        .collect();

    Ok(SeriesReport {
        symbol: spec.symbol.clone(),
        interval: code,
        series_empty: false,
        first_open_time: Some(first),
        last_open_time: Some(last),
        candle_count: times.len() as i64,
        gap_count: gaps.len(),
        gap_samples,
        null_span_count: spans.len(),
        null_span_samples,
    })
}

fn empty_report(spec: &SeriesSpec, code: String) -> SeriesReport {
    SeriesReport {
        symbol: spec.symbol.clone(),
        interval: code,
        series_empty: true,
        first_open_time: None,
        last_open_time: None,
        candle_count: 0,
        gap_count: 0,
        gap_samples: Vec::new(),
        null_span_count: 0,
        null_span_samples: Vec::new(),
    }
}
