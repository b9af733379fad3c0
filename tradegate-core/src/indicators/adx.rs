//! ADX: Average Directional Index (Wilder).
//!
//! +DM/-DM and TR are Wilder-smoothed into +DI/-DI, DX = 100·|+DI − −DI| / (+DI + −DI),
//! and ADX is the Wilder-smoothed DX. Lookback: 2 * period.

use super::atr::{true_range, wilder_smooth};
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: Self::key(period),
        }
    }

    pub fn key(period: usize) -> String {
        format!("adx_{period}")
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        if n < 2 {
            return vec![f64::NAN; n];
        }

        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];
        for i in 1..n {
            let up = bars[i].high - bars[i - 1].high;
            let down = bars[i - 1].low - bars[i].low;
            if up.is_nan() || down.is_nan() {
                continue;
            }
            plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
            minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        }

        let mut tr = true_range(bars);
        tr[0] = f64::NAN;
        let smooth_tr = wilder_smooth(&tr, self.period);
        let smooth_plus = wilder_smooth(&plus_dm, self.period);
        let smooth_minus = wilder_smooth(&minus_dm, self.period);

        let dx: Vec<f64> = (0..n)
            .map(|i| {
                let (tr, p, m) = (smooth_tr[i], smooth_plus[i], smooth_minus[i]);
                if tr.is_nan() || p.is_nan() || m.is_nan() || tr == 0.0 {
                    return f64::NAN;
                }
                let plus_di = 100.0 * p / tr;
                let minus_di = 100.0 * m / tr;
                let sum = plus_di + minus_di;
                if sum == 0.0 {
                    0.0
                } else {
                    100.0 * (plus_di - minus_di).abs() / sum
                }
            })
            .collect();

        wilder_smooth(&dx, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::atr::make_ohlc_bars;

    fn trending_bars(n: usize) -> Vec<Bar> {
        let data: Vec<(f64, f64, f64, f64)> = (0..n)
            .map(|i| {
                let base = 100.0 + 2.0 * i as f64;
                (base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        make_ohlc_bars(&data)
    }

    #[test]
    fn adx_warmup_then_values() {
        let bars = trending_bars(20);
        let result = Adx::new(3).compute(&bars);
        assert!(result[..5].iter().all(|v| v.is_nan()));
        assert!(result[19].is_finite());
    }

    #[test]
    fn strong_trend_has_high_adx() {
        let bars = trending_bars(40);
        let result = Adx::new(5).compute(&bars);
        let last = result[39];
        assert!(last > 90.0, "steady one-way trend should read near 100, got {last}");
    }

    #[test]
    fn adx_bounds() {
        let data: Vec<(f64, f64, f64, f64)> = (0..40)
            .map(|i| {
                let c = 100.0 + ((i as f64) * 0.7).sin() * 5.0;
                (c, c + 1.0, c - 1.0, c)
            })
            .collect();
        let result = Adx::new(5).compute(&make_ohlc_bars(&data));
        for v in result.into_iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v), "ADX out of bounds: {v}");
        }
    }

    #[test]
    fn adx_lookback() {
        assert_eq!(Adx::new(14).lookback(), 28);
    }
}
