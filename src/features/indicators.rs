//! Trailing-window indicator kernels
//!
//! Every function maps a series to a series of the same length. Output at
//! index `i` only reads inputs at indices `<= i`; undefined values are NaN.

/// Simple moving average; NaN until `period` valid values fill the window
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first valid value (recursive form, no bias adjustment)
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    ewm(values, 2.0 / (span as f64 + 1.0))
}

/// Recursive exponential smoothing; NaN inputs carry the previous state
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;
    for &v in values {
        if v.is_finite() {
            state = Some(match state {
                Some(prev) => alpha * v + (1.0 - alpha) * prev,
                None => v,
            });
        }
        out.push(state.unwrap_or(f64::NAN));
    }
    out
}

/// Sample standard deviation over a trailing window
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, period.max(2), sample_std)
}

/// Rolling statistic over the trailing `period` values, requiring at least
/// `min_periods` finite values in the window
pub fn rolling<F>(values: &[f64], period: usize, min_periods: usize, stat: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let mut window: Vec<f64> = Vec::with_capacity(period);
    for i in 0..values.len() {
        let start = (i + 1).saturating_sub(period);
        window.clear();
        window.extend(values[start..=i].iter().copied().filter(|v| v.is_finite()));
        if window.len() >= min_periods.max(1) {
            out[i] = stat(&window);
        }
    }
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Linear-interpolated quantile of unsorted values (NaN-free input)
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, q)
}

pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// `values[i] / values[i - n] - 1`
pub fn pct_change(values: &[f64], n: usize) -> Vec<f64> {
    lagged(values, n, |now, then| if then != 0.0 { now / then - 1.0 } else { f64::NAN })
}

/// `ln(values[i] / values[i - n])`
pub fn log_change(values: &[f64], n: usize) -> Vec<f64> {
    lagged(values, n, |now, then| {
        if now > 0.0 && then > 0.0 {
            (now / then).ln()
        } else {
            f64::NAN
        }
    })
}

/// `values[i - n]`
pub fn lag(values: &[f64], n: usize) -> Vec<f64> {
    lagged(values, n, |_, then| then)
}

fn lagged<F: Fn(f64, f64) -> f64>(values: &[f64], n: usize, f: F) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < n {
                f64::NAN
            } else {
                let v = f(values[i], values[i - n]);
                if v.is_finite() { v } else { f64::NAN }
            }
        })
        .collect()
}

/// RSI with Wilder smoothing of gains and losses
///
/// Seeded with the simple mean of the first `period` changes, then
/// `avg = (avg * (period - 1) + x) / period`.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    let p = period as f64;
    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        if !change.is_finite() {
            out[i] = out[i - 1];
            continue;
        }
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD line, signal line and histogram
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let hist = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();
    (line, signal_line, hist)
}

/// Bollinger bands: (middle, upper, lower)
pub fn bollinger(values: &[f64], period: usize, num_std: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma(values, period);
    let std = rolling_std(values, period);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + num_std * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - num_std * s).collect();
    (middle, upper, lower)
}

/// Rolling Pearson correlation and beta of `y` on `x`
pub fn rolling_corr_beta(x: &[f64], y: &[f64], period: usize) -> (Vec<f64>, Vec<f64>) {
    let n = x.len().min(y.len());
    let mut corr = vec![f64::NAN; n];
    let mut beta = vec![f64::NAN; n];
    let min_periods = period.max(3);
    for i in 0..n {
        let start = (i + 1).saturating_sub(period);
        let pairs: Vec<(f64, f64)> = (start..=i)
            .map(|j| (x[j], y[j]))
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .collect();
        if pairs.len() < min_periods {
            continue;
        }
        let len = pairs.len() as f64;
        let mx = pairs.iter().map(|p| p.0).sum::<f64>() / len;
        let my = pairs.iter().map(|p| p.1).sum::<f64>() / len;
        let mut cov = 0.0;
        let mut vx = 0.0;
        let mut vy = 0.0;
        for (a, b) in &pairs {
            cov += (a - mx) * (b - my);
            vx += (a - mx).powi(2);
            vy += (b - my).powi(2);
        }
        if vx > 0.0 {
            beta[i] = cov / vx;
            if vy > 0.0 {
                corr[i] = cov / (vx * vy).sqrt();
            }
        }
    }
    (corr, beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma_warmup() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert!(close(out[2], 2.0));
        assert!(close(out[3], 3.0));
    }

    #[test]
    fn test_ema_recursive() {
        let out = ema(&[10.0, 20.0], 3);
        // alpha = 0.5
        assert!(close(out[0], 10.0));
        assert!(close(out[1], 15.0));
    }

    #[test]
    fn test_rolling_std_sample() {
        let out = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert!(close(out[7], (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(quantile(&v, 0.5), 3.0));
        assert!(close(quantile(&v, 0.2), 1.8));
        assert!(close(quantile(&v, 1.0), 5.0));
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let out = rsi(&rising, 14);
        assert!(out[13].is_nan());
        assert!(close(out[14], 100.0));
        assert!(close(out[29], 100.0));

        let flat = vec![5.0; 20];
        assert!(close(rsi(&flat, 14)[19], 50.0));

        let zigzag: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let v = rsi(&zigzag, 14)[39];
        assert!(v > 40.0 && v < 60.0);
    }

    #[test]
    fn test_macd_constant_series_is_zero() {
        let (line, signal, hist) = macd(&vec![7.0; 50], 12, 26, 9);
        assert!(close(line[49], 0.0));
        assert!(close(signal[49], 0.0));
        assert!(close(hist[49], 0.0));
    }

    #[test]
    fn test_bollinger_symmetry() {
        let values: Vec<f64> = (0..25).map(|i| (i % 3) as f64).collect();
        let (mid, up, low) = bollinger(&values, 20, 2.0);
        assert!(close(up[24] - mid[24], mid[24] - low[24]));
        assert!(mid[18].is_nan());
    }

    #[test]
    fn test_changes() {
        let v = [100.0, 110.0, 121.0];
        assert!(close(pct_change(&v, 1)[1], 0.1));
        assert!(close(log_change(&v, 2)[2], (1.21f64).ln()));
        assert!(close(lag(&v, 1)[2], 110.0));
        assert!(lag(&v, 1)[0].is_nan());
    }

    #[test]
    fn test_corr_beta() {
        let x: Vec<f64> = (0..10).map(|i| (i as f64 * 0.7).sin()).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let (corr, beta) = rolling_corr_beta(&x, &y, 5);
        assert!(close(corr[9], 1.0));
        assert!(close(beta[9], 2.0));
        assert!(beta[3].is_nan());
    }
}
