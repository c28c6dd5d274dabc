/// Average Directional Index — double Wilder smoothing.
///
/// 1. ±DM and TR samples exist from index 1.
/// 2. The smoothed sums are seeded as plain sums over the first `period`
///    samples, then advance by `x ← x − x/period + x_i`.
/// 3. `±DI = 100·(±DM_s/TR_s)`, `DX = 100·|+DI − −DI|/(+DI + −DI)`;
///    the first DX lands at `i = period`.
/// 4. ADX seeds as the mean of the first `period` DX values
///    (at `i = 2·period−1`) and is Wilder-smoothed from there.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    assert!(period >= 1, "adx period must be >= 1");
    assert!(
        high.len() == low.len() && low.len() == close.len(),
        "adx inputs must be aligned"
    );
    let n = high.len();
    let mut out = vec![None; n];

    let w = period as f64;
    let mut sm_plus = 0.0;
    let mut sm_minus = 0.0;
    let mut sm_tr = 0.0;
    let mut dx_sum = 0.0;
    let mut dx_count = 0usize;
    let mut adx_val = 0.0;

    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        let tr = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());

        if i <= period {
            sm_plus += plus_dm;
            sm_minus += minus_dm;
            sm_tr += tr;
            if i == period {
                dx_sum = dx_of(sm_plus, sm_minus, sm_tr);
                dx_count = 1;
            }
            continue;
        }

        sm_plus = sm_plus - sm_plus / w + plus_dm;
        sm_minus = sm_minus - sm_minus / w + minus_dm;
        sm_tr = sm_tr - sm_tr / w + tr;
        let dx = dx_of(sm_plus, sm_minus, sm_tr);

        if dx_count < period {
            dx_sum += dx;
            dx_count += 1;
            if dx_count == period {
                adx_val = dx_sum / w;
                out[i] = Some(adx_val);
            }
        } else {
            adx_val = (adx_val * (w - 1.0) + dx) / w;
            out[i] = Some(adx_val);
        }
    }
    out
}

fn dx_of(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> f64 {
    if sm_tr <= 0.0 {
        return 0.0;
    }
    let di_pos = 100.0 * (sm_plus / sm_tr);
    let di_neg = 100.0 * (sm_minus / sm_tr);
    let di_sum = di_pos + di_neg;
    if di_sum > 0.0 {
        100.0 * (di_pos - di_neg).abs() / di_sum
    } else {
        0.0
    }
}
