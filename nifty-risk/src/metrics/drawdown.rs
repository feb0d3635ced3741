//! Peak-to-trough drawdown of a close series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Drawdown analysis details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    /// Largest decline from a running peak, in percent (positive).
    pub max_drawdown_pct: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// First date at or above the peak after the trough.
    pub recovery_date: Option<NaiveDate>,
    /// Calendar days from peak to trough of the worst drawdown.
    pub duration_days: i64,
    pub avg_drawdown_pct: f64,
    /// Number of distinct episodes below a running peak.
    pub drawdown_periods: usize,
}

/// Analyze drawdowns over aligned closes. Undefined closes are skipped.
pub fn analyze_drawdown(dates: &[NaiveDate], closes: &[Option<f64>]) -> DrawdownAnalysis {
    let points: Vec<(NaiveDate, f64)> = dates
        .iter()
        .zip(closes)
        .filter_map(|(d, c)| c.filter(|v| *v > 0.0).map(|v| (*d, v)))
        .collect();

    let Some(&(first_date, first_close)) = points.first() else {
        return DrawdownAnalysis::default();
    };

    let mut peak = first_close;
    let mut peak_date = first_date;
    let mut in_drawdown = false;
    let mut periods = 0;
    let mut drawdowns = Vec::new();

    let mut max_dd = 0.0;
    let mut worst: Option<(NaiveDate, NaiveDate, f64)> = None;

    for &(date, close) in &points {
        if close >= peak {
            peak = close;
            peak_date = date;
            in_drawdown = false;
            continue;
        }

        if !in_drawdown {
            in_drawdown = true;
            periods += 1;
        }

        let dd_pct = (peak - close) / peak * 100.0;
        drawdowns.push(dd_pct);

        if dd_pct > max_dd {
            max_dd = dd_pct;
            worst = Some((peak_date, date, peak));
        }
    }

    let Some((worst_peak, trough, peak_level)) = worst else {
        return DrawdownAnalysis::default();
    };

    let recovery_date = points
        .iter()
        .find(|(d, c)| *d > trough && *c >= peak_level)
        .map(|(d, _)| *d);

    DrawdownAnalysis {
        max_drawdown_pct: max_dd,
        peak_date: Some(worst_peak),
        trough_date: Some(trough),
        recovery_date,
        duration_days: (trough - worst_peak).num_days(),
        avg_drawdown_pct: drawdowns.iter().sum::<f64>() / drawdowns.len() as f64,
        drawdown_periods: periods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_drawdown_analysis_empty() {
        let analysis = analyze_drawdown(&[], &[]);
        assert_eq!(analysis.max_drawdown_pct, 0.0);
        assert_eq!(analysis.drawdown_periods, 0);
    }

    #[test]
    fn test_monotonic_has_no_drawdown() {
        let closes: Vec<Option<f64>> = (1..=5).map(|i| Some(i as f64)).collect();
        let analysis = analyze_drawdown(&dates(5), &closes);
        assert_eq!(analysis.max_drawdown_pct, 0.0);
        assert_eq!(analysis.peak_date, None);
    }

    #[test]
    fn test_drawdown_figures() {
        let d = dates(8);
        let closes = vec![
            Some(100.0),
            Some(120.0),
            Some(90.0),
            Some(60.0),
            None,
            Some(110.0),
            Some(125.0),
            Some(118.0),
        ];
        let analysis = analyze_drawdown(&d, &closes);

        assert!((analysis.max_drawdown_pct - 50.0).abs() < 1e-12);
        assert_eq!(analysis.peak_date, Some(d[1]));
        assert_eq!(analysis.trough_date, Some(d[3]));
        assert_eq!(analysis.recovery_date, Some(d[6]));
        assert_eq!(analysis.duration_days, 2);
        assert_eq!(analysis.drawdown_periods, 2);
    }

    #[test]
    fn test_unrecovered_drawdown() {
        let closes = vec![Some(100.0), Some(80.0), Some(90.0)];
        let analysis = analyze_drawdown(&dates(3), &closes);
        assert!((analysis.max_drawdown_pct - 20.0).abs() < 1e-12);
        assert_eq!(analysis.recovery_date, None);
    }
}
