//! Volatility regime classifier.
//!
//! Labels each session of a rolling-volatility series Low, Medium or High
//! against two thresholds, either fixed levels or quantiles of the
//! series' own defined values. With a positive `persistence_band` the
//! label depends on the prior session's regime: leaving a regime requires
//! crossing its boundary by more than the band.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};

/// Volatility regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Regime {
    Low,
    Medium,
    High,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Low, Regime::Medium, Regime::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Plain threshold rule: v <= low is Low, v <= high is Medium.
    pub fn from_value(value: f64, thresholds: &RegimeThresholds) -> Self {
        if value <= thresholds.low {
            Self::Low
        } else if value <= thresholds.high {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// How thresholds are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Absolute volatility levels.
    Fixed { low: f64, high: f64 },
    /// Quantiles (0..1) of the series' defined values.
    Quantile { low: f64, high: f64 },
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        Self::Quantile {
            low: 1.0 / 3.0,
            high: 2.0 / 3.0,
        }
    }
}

/// Regime classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeClassifierConfig {
    /// Rolling volatility window the regimes are computed on.
    pub window: usize,
    pub method: ThresholdMethod,
    /// Extra distance past a boundary required to leave the prior regime.
    pub persistence_band: f64,
}

impl Default for RegimeClassifierConfig {
    fn default() -> Self {
        Self {
            window: 30,
            method: ThresholdMethod::default(),
            persistence_band: 0.0,
        }
    }
}

/// Resolved threshold levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub low: f64,
    pub high: f64,
}

/// A labelled session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeLabel {
    pub date: NaiveDate,
    pub sector: String,
    pub regime: Regime,
}

/// A change of regime between consecutive labelled sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeTransition {
    pub date: NaiveDate,
    pub from: Regime,
    pub to: Regime,
}

/// Statistics for a regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: Regime,
    pub days: usize,
    /// Share of labelled sessions, in percent.
    pub pct_of_total: f64,
    pub avg_value: f64,
}

impl Default for RegimeStats {
    fn default() -> Self {
        Self {
            regime: Regime::Medium,
            days: 0,
            pct_of_total: 0.0,
            avg_value: 0.0,
        }
    }
}

/// Output of classifying one series.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeAnalysis {
    pub sector: String,
    pub thresholds: Option<RegimeThresholds>,
    /// One label per input value.
    pub labels: Vec<Option<Regime>>,
    pub transitions: Vec<RegimeTransition>,
    pub stats: BTreeMap<Regime, RegimeStats>,
}

impl RegimeAnalysis {
    /// Expand into per-date labels, skipping unlabelled sessions.
    pub fn records(&self, dates: &[NaiveDate]) -> Vec<RegimeLabel> {
        dates
            .iter()
            .zip(&self.labels)
            .filter_map(|(date, label)| {
                label.map(|regime| RegimeLabel {
                    date: *date,
                    sector: self.sector.clone(),
                    regime,
                })
            })
            .collect()
    }
}

/// Stateful regime classifier.
pub struct RegimeClassifier {
    config: RegimeClassifierConfig,
    thresholds: Option<RegimeThresholds>,
    prior: Option<Regime>,
    regime_history: Vec<(NaiveDate, Option<Regime>, Option<f64>)>,
    transitions: Vec<RegimeTransition>,
}

impl RegimeClassifier {
    /// Create a new classifier. Fixed thresholds are ready immediately;
    /// quantile thresholds need [`fit`](Self::fit).
    pub fn new(config: RegimeClassifierConfig) -> Self {
        let thresholds = match config.method {
            ThresholdMethod::Fixed { low, high } => Some(RegimeThresholds { low, high }),
            ThresholdMethod::Quantile { .. } => None,
        };
        Self {
            config,
            thresholds,
            prior: None,
            regime_history: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn config(&self) -> &RegimeClassifierConfig {
        &self.config
    }

    pub fn thresholds(&self) -> Option<RegimeThresholds> {
        self.thresholds
    }

    /// Resolve thresholds from a series. Returns `None` for quantile
    /// thresholds when the series has no defined value.
    pub fn fit(&mut self, values: &[Option<f64>]) -> Option<RegimeThresholds> {
        if let ThresholdMethod::Quantile { low, high } = self.config.method {
            let defined: Vec<f64> = values.iter().flatten().copied().collect();
            self.thresholds = if defined.is_empty() {
                None
            } else {
                let mut data = Data::new(defined);
                Some(RegimeThresholds {
                    low: data.quantile(low),
                    high: data.quantile(high),
                })
            };
        }
        self.thresholds
    }

    /// Classify one session. An undefined value yields no label and resets
    /// the prior regime.
    pub fn classify(&mut self, date: NaiveDate, value: Option<f64>) -> Option<Regime> {
        let regime = match (value, self.thresholds) {
            (Some(v), Some(t)) => Some(self.classify_with_prior(v, &t)),
            _ => None,
        };

        if let (Some(from), Some(to)) = (self.prior, regime) {
            if from != to {
                self.transitions.push(RegimeTransition { date, from, to });
            }
        }

        self.prior = regime;
        self.regime_history.push((date, regime, value));
        regime
    }

    fn classify_with_prior(&self, value: f64, t: &RegimeThresholds) -> Regime {
        let raw = Regime::from_value(value, t);
        let band = self.config.persistence_band;
        let Some(prior) = self.prior else {
            return raw;
        };
        if band <= 0.0 {
            return raw;
        }

        let leaves = match prior {
            Regime::Low => value > t.low + band,
            Regime::Medium => value > t.high + band || value < t.low - band,
            Regime::High => value < t.high - band,
        };
        if leaves {
            raw
        } else {
            prior
        }
    }

    /// Get regime statistics over labelled sessions.
    pub fn get_stats(&self) -> BTreeMap<Regime, RegimeStats> {
        let mut stats: BTreeMap<Regime, RegimeStats> = BTreeMap::new();
        let mut sums: BTreeMap<Regime, f64> = BTreeMap::new();

        for (_, regime, value) in &self.regime_history {
            let (Some(regime), Some(value)) = (regime, value) else {
                continue;
            };
            let entry = stats.entry(*regime).or_insert_with(|| RegimeStats {
                regime: *regime,
                ..Default::default()
            });
            entry.days += 1;
            *sums.entry(*regime).or_insert(0.0) += value;
        }

        let total: usize = stats.values().map(|s| s.days).sum();
        for entry in stats.values_mut() {
            entry.pct_of_total = entry.days as f64 / total as f64 * 100.0;
            entry.avg_value = sums.get(&entry.regime).copied().unwrap_or(0.0) / entry.days as f64;
        }

        stats
    }

    /// Get current regime.
    pub fn current_regime(&self) -> Option<Regime> {
        self.prior
    }

    /// Get regime history.
    pub fn regime_history(&self) -> Vec<(NaiveDate, Option<Regime>)> {
        self.regime_history.iter().map(|(d, r, _)| (*d, *r)).collect()
    }

    pub fn transitions(&self) -> &[RegimeTransition] {
        &self.transitions
    }

    /// Clear history and prior state. Fitted thresholds are kept.
    pub fn clear(&mut self) {
        self.prior = None;
        self.regime_history.clear();
        self.transitions.clear();
    }

    /// Fit thresholds and classify a whole series from a clean state.
    pub fn analyze(&mut self, sector: &str, dates: &[NaiveDate], values: &[Option<f64>]) -> RegimeAnalysis {
        self.clear();
        let thresholds = self.fit(values);

        let labels = dates
            .iter()
            .zip(values)
            .map(|(date, value)| self.classify(*date, *value))
            .collect();

        RegimeAnalysis {
            sector: sector.to_string(),
            thresholds,
            labels,
            transitions: self.transitions.clone(),
            stats: self.get_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn fixed(low: f64, high: f64, band: f64) -> RegimeClassifierConfig {
        RegimeClassifierConfig {
            method: ThresholdMethod::Fixed { low, high },
            persistence_band: band,
            ..Default::default()
        }
    }

    #[test]
    fn test_threshold_rule_is_inclusive() {
        let t = RegimeThresholds { low: 0.1, high: 0.2 };
        assert_eq!(Regime::from_value(0.1, &t), Regime::Low);
        assert_eq!(Regime::from_value(0.2, &t), Regime::Medium);
        assert_eq!(Regime::from_value(0.2001, &t), Regime::High);
    }

    #[test]
    fn test_quantile_thresholds_split_levels() {
        let values: Vec<Option<f64>> = [1.0; 10]
            .iter()
            .chain([5.0; 10].iter())
            .chain([9.0; 10].iter())
            .map(|v| Some(*v))
            .collect();
        let mut classifier = RegimeClassifier::new(RegimeClassifierConfig::default());
        let analysis = classifier.analyze("NIFTY_IT", &dates(30), &values);

        assert!(analysis.labels[..10].iter().all(|l| *l == Some(Regime::Low)));
        assert!(analysis.labels[10..20].iter().all(|l| *l == Some(Regime::Medium)));
        assert!(analysis.labels[20..].iter().all(|l| *l == Some(Regime::High)));
        assert_eq!(analysis.transitions.len(), 2);

        let low = &analysis.stats[&Regime::Low];
        assert_eq!(low.days, 10);
        assert!((low.avg_value - 1.0).abs() < 1e-12);
        assert!((low.pct_of_total - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_classifier_is_idempotent() {
        let values: Vec<Option<f64>> = (0..50).map(|i| Some(((i * 17) % 23) as f64)).collect();
        let d = dates(50);
        let mut classifier = RegimeClassifier::new(RegimeClassifierConfig::default());

        let first = classifier.analyze("X", &d, &values);
        let second = classifier.analyze("X", &d, &values);
        assert_eq!(first, second);

        let mut fresh = RegimeClassifier::new(RegimeClassifierConfig::default());
        assert_eq!(fresh.analyze("X", &d, &values), first);
    }

    #[test]
    fn test_one_day_flicker_is_two_transitions() {
        let values = vec![Some(0.5), Some(0.5), Some(3.0), Some(0.5), Some(0.5)];
        let d = dates(5);
        let mut classifier = RegimeClassifier::new(fixed(1.0, 2.0, 0.0));
        let analysis = classifier.analyze("X", &d, &values);

        assert_eq!(analysis.labels[2], Some(Regime::High));
        assert_eq!(
            analysis.transitions,
            vec![
                RegimeTransition { date: d[2], from: Regime::Low, to: Regime::High },
                RegimeTransition { date: d[3], from: Regime::High, to: Regime::Low },
            ]
        );
    }

    #[test]
    fn test_persistence_band_holds_prior_regime() {
        let values = vec![Some(0.5), Some(1.2), Some(1.6), Some(2.1), Some(1.9)];
        let mut classifier = RegimeClassifier::new(fixed(1.0, 2.0, 0.5));
        let analysis = classifier.analyze("X", &dates(5), &values);

        assert_eq!(
            analysis.labels,
            vec![
                Some(Regime::Low),
                Some(Regime::Low),
                Some(Regime::Medium),
                Some(Regime::Medium),
                Some(Regime::Medium),
            ]
        );
    }

    #[test]
    fn test_undefined_resets_state() {
        let values = vec![Some(0.5), None, Some(3.0)];
        let mut classifier = RegimeClassifier::new(fixed(1.0, 2.0, 0.0));
        let analysis = classifier.analyze("X", &dates(3), &values);

        assert_eq!(analysis.labels, vec![Some(Regime::Low), None, Some(Regime::High)]);
        assert!(analysis.transitions.is_empty());
        assert_eq!(analysis.records(&dates(3)).len(), 2);
    }

    #[test]
    fn test_quantile_without_values() {
        let mut classifier = RegimeClassifier::new(RegimeClassifierConfig::default());
        let analysis = classifier.analyze("X", &dates(2), &[None, None]);
        assert_eq!(analysis.thresholds, None);
        assert!(analysis.labels.iter().all(|l| l.is_none()));
        assert!(analysis.stats.is_empty());
    }
}
