//! End-to-end engine behavior against a deterministic simulated exchange:
//! bootstrap, idempotent update, gap detection and repair, known-gap
//! suppression, dry runs and interrupts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cv_client::ClientError;
use cv_core::candle::Candle;
use cv_core::interval::{floor_to_interval, last_closed_open_time, Interval};
use cv_engine::ingest::{bootstrap, update};
use cv_engine::repair::repair;
use cv_engine::source::KlineSource;
use cv_engine::verify::verify;
use cv_engine::{EngineError, SeriesSpec, ShutdownFlag};
use cv_store::{self as store, Store};

const IV: Interval = Interval::H1;
const MS: i64 = 3_600_000;

/// Deterministic exchange: bars exist from `listing_start` up to the last
/// bar closed by `now`, except inside `holes`. Requests honor start, end
/// and limit the way the real endpoint does (first `limit` bars from the
/// start of the window).
struct SimExchange {
    listing_start: i64,
    now_ms: i64,
    holes: Vec<(i64, i64)>,
    requests: AtomicUsize,
}

impl SimExchange {
    fn new(listing_start: i64, now_ms: i64) -> Self {
        Self {
            listing_start,
            now_ms,
            holes: Vec::new(),
            requests: AtomicUsize::new(0),
        }
    }

    fn with_hole(mut self, from: i64, to: i64) -> Self {
        self.holes.push((from, to));
        self
    }

    fn bar(open_time: i64) -> Candle {
        let x = (open_time / MS) as f64;
        let close = 100.0 + (x * 0.05).sin() * 10.0 + (x * 0.011).cos() * 4.0;
        Candle {
            open_time,
            open: close - 0.2,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 50.0 + (x * 0.3).sin().abs() * 20.0,
            close_time: open_time + MS - 1,
            quote_asset_volume: close * 50.0,
            trades: 250,
            taker_buy_base_volume: 25.0,
            taker_buy_quote_volume: close * 25.0,
        }
    }
}

impl KlineSource for SimExchange {
    async fn get_klines(
        &self,
        _symbol: &str,
        interval: Interval,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>, ClientError> {
        assert_eq!(interval, IV);
        self.requests.fetch_add(1, Ordering::SeqCst);

        let last_closed = last_closed_open_time(self.now_ms, MS);
        let start = start_ms.unwrap_or(self.listing_start).max(self.listing_start);
        let end = end_ms.unwrap_or(i64::MAX).min(last_closed);

        // First aligned open time at or after the requested start.
        let mut t = floor_to_interval(start, MS);
        if t < start {
            t += MS;
        }

        let mut out = Vec::new();
        while t <= end && out.len() < limit as usize {
            let in_hole = self.holes.iter().any(|&(a, b)| t >= a && t <= b);
            if !in_hole {
                out.push(Self::bar(t));
            }
            t += MS;
        }
        Ok(out)
    }
}

fn no_shutdown() -> ShutdownFlag {
    Arc::new(AtomicBool::new(false))
}

fn spec() -> SeriesSpec {
    SeriesSpec {
        symbol: "BTCUSDT".to_string(),
        interval: IV,
    }
}

/// 3000 closed bars ending just before `now`.
fn fixture_times() -> (i64, i64) {
    let start = 1_600_000_000_000_i64 / MS * MS;
    let now = start + 3_000 * MS + 1_234;
    (start, now)
}

fn snapshot(db: &Store, series_id: i64) -> (Vec<Candle>, Vec<cv_core::candle::IndicatorRow>) {
    let candles = db
        .load_candles_range(series_id, 0, i64::MAX, MS)
        .unwrap();
    let rows = db.load_indicator_rows(series_id).unwrap();
    (candles, rows)
}

#[tokio::test]
async fn bootstrap_stores_every_closed_bar_with_indicators() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();

    let outcome = bootstrap(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();

    let series_id = db.get_series_id("BTCUSDT", "1h").unwrap().unwrap();
    let expected_bars = 3_000; // open times start..start+2999*MS, all closed
    assert_eq!(db.count_candles(series_id).unwrap(), expected_bars);
    assert_eq!(outcome.candles_written, expected_bars as u64);

    // Bar alignment invariant.
    for t in db.load_open_times(series_id).unwrap() {
        assert_eq!(t % MS, 0);
    }

    // Indicators exist one-to-one and are warm past the first 200 bars.
    let rows = db.load_indicator_rows(series_id).unwrap();
    assert_eq!(rows.len() as i64, expected_bars);
    for row in rows.iter().skip(200) {
        assert!(!row.is_all_null(), "cold row at {}", row.open_time);
        assert!(row.ema200.is_some());
    }

    // Clean verify.
    let report = verify(&db, &[spec()]).unwrap();
    assert!(report.clean());
    assert_eq!(report.series[0].candle_count, expected_bars);
    assert!(!report.series[0].series_empty);
}

#[tokio::test]
async fn double_update_is_bit_identical() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();

    bootstrap(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();
    let series_id = db.get_series_id("BTCUSDT", "1h").unwrap().unwrap();

    update(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();
    let first = snapshot(&db, series_id);

    update(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();
    let second = snapshot(&db, series_id);

    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
}

#[tokio::test]
async fn update_catches_up_new_bars() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();
    bootstrap(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();

    // Time advances by 48 bars.
    let later = now + 48 * MS;
    let sim = SimExchange::new(start, later);
    update(&sim, &mut db, &spec(), start, later, false, &no_shutdown())
        .await
        .unwrap();

    let series_id = db.get_series_id("BTCUSDT", "1h").unwrap().unwrap();
    assert_eq!(db.count_candles(series_id).unwrap(), 3_048);
    assert!(verify(&db, &[spec()]).unwrap().clean());
}

#[tokio::test]
async fn deleted_bars_are_reported_and_repaired() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();
    bootstrap(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();
    let series_id = db.get_series_id("BTCUSDT", "1h").unwrap().unwrap();
    let before = snapshot(&db, series_id);

    // Punch a three-bar hole in the middle.
    let hole_start = start + 1_500 * MS;
    let hole_end = start + 1_502 * MS;
    db.tx(false, |conn| {
        store::delete_range(conn, series_id, hole_start, hole_end)
    })
    .unwrap();

    let report = verify(&db, &[spec()]).unwrap();
    assert_eq!(report.series[0].gap_count, 1);
    let sample = &report.series[0].gap_samples[0];
    assert_eq!(sample.start_missing, hole_start);
    assert_eq!(sample.end_missing, hole_end);
    assert_eq!(sample.missing_bars, 3);

    let summary = repair(&sim, &mut db, &[spec()], now, &no_shutdown())
        .await
        .unwrap();
    assert!(summary.clean());
    assert_eq!(summary.series[0].gaps_repaired, 1);
    assert_eq!(summary.series[0].gaps_remaining, 0);

    // Continuity and contents restored.
    assert!(verify(&db, &[spec()]).unwrap().clean());
    let after = snapshot(&db, series_id);
    assert_eq!(before.0, after.0, "candles diverged after repair");

    // A second repair is a no-op.
    let summary = repair(&sim, &mut db, &[spec()], now, &no_shutdown())
        .await
        .unwrap();
    assert_eq!(summary.series[0].gaps_repaired, 0);
    assert_eq!(summary.series[0].null_spans_repaired, 0);
}

#[tokio::test]
async fn nulled_indicator_rows_are_recomputed() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();
    bootstrap(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();
    let series_id = db.get_series_id("BTCUSDT", "1h").unwrap().unwrap();

    // Blank out four indicator rows deep past warm-up.
    let blank_start = start + 2_000 * MS;
    let blanks: Vec<cv_core::candle::IndicatorRow> = (0..4)
        .map(|i| cv_core::candle::IndicatorRow {
            open_time: blank_start + i * MS,
            ..Default::default()
        })
        .collect();
    db.tx(false, |conn| store::upsert_indicators(conn, series_id, &blanks))
        .unwrap();

    let report = verify(&db, &[spec()]).unwrap();
    assert_eq!(report.series[0].null_span_count, 1);
    assert_eq!(report.series[0].null_span_samples[0].rows, 4);

    let summary = repair(&sim, &mut db, &[spec()], now, &no_shutdown())
        .await
        .unwrap();
    assert!(summary.clean());
    assert_eq!(summary.series[0].null_spans_repaired, 1);
    assert_eq!(summary.series[0].null_indicator_rows_remaining, 0);
    assert!(verify(&db, &[spec()]).unwrap().clean());
}

#[tokio::test]
async fn known_gap_windows_suppress_verify_and_repair() {
    let (start, now) = fixture_times();
    let hole_start = start + 800 * MS;
    let hole_end = start + 805 * MS;
    // The exchange genuinely has no data there (outage window).
    let sim = SimExchange::new(start, now).with_hole(hole_start, hole_end);
    let mut db = Store::open_in_memory().unwrap();
    bootstrap(&sim, &mut db, &spec(), start, now, false, &no_shutdown())
        .await
        .unwrap();
    let series_id = db.get_series_id("BTCUSDT", "1h").unwrap().unwrap();

    // Unregistered: reported as a gap (and unrepairable, the data does not
    // exist upstream).
    let report = verify(&db, &[spec()]).unwrap();
    assert_eq!(report.series[0].gap_count, 1);

    // Registered: verify is clean and repair leaves it alone.
    db.add_known_gap(series_id, hole_start, hole_end).unwrap();
    let report = verify(&db, &[spec()]).unwrap();
    assert_eq!(report.series[0].gap_count, 0);
    assert!(report.clean());

    let requests_before = sim.requests.load(Ordering::SeqCst);
    let summary = repair(&sim, &mut db, &[spec()], now, &no_shutdown())
        .await
        .unwrap();
    assert!(summary.clean());
    assert_eq!(summary.series[0].gaps_repaired, 0);
    assert_eq!(sim.requests.load(Ordering::SeqCst), requests_before);
}

#[tokio::test]
async fn dry_run_bootstrap_leaves_the_store_empty() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();

    bootstrap(&sim, &mut db, &spec(), start, now, true, &no_shutdown())
        .await
        .unwrap();

    assert_eq!(db.get_series_id("BTCUSDT", "1h").unwrap(), None);
    let symbols: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))
        .unwrap();
    assert_eq!(symbols, 0);
    let candles: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM candles", [], |r| r.get(0))
        .unwrap();
    assert_eq!(candles, 0);
}

#[tokio::test]
async fn shutdown_flag_interrupts_at_the_chunk_boundary() {
    let (start, now) = fixture_times();
    let sim = SimExchange::new(start, now);
    let mut db = Store::open_in_memory().unwrap();

    let flag: ShutdownFlag = Arc::new(AtomicBool::new(true));
    let err = bootstrap(&sim, &mut db, &spec(), start, now, false, &flag)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Interrupted));
    assert_eq!(sim.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_series_yields_an_empty_report() {
    let db = Store::open_in_memory().unwrap();
    let report = verify(&db, &[spec()]).unwrap();
    assert!(report.series[0].series_empty);
    assert_eq!(report.series[0].candle_count, 0);
    assert_eq!(report.integrity, "ok");
}
