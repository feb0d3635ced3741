//! Daily and horizon returns from aligned closes.

use serde::{Deserialize, Serialize};

/// Return definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// ln(P_t / P_{t-1})
    #[default]
    Log,
    /// P_t / P_{t-1} - 1
    Simple,
}

/// One-period returns.
///
/// `r_t` is undefined at `t = 0` and wherever either close is missing or
/// non-positive.
pub fn compute_returns(closes: &[Option<f64>], kind: ReturnKind) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(None);

    for w in closes.windows(2) {
        let r = match (w[0], w[1]) {
            (Some(prev), Some(curr)) if prev > 0.0 && curr > 0.0 => Some(match kind {
                ReturnKind::Log => (curr / prev).ln(),
                ReturnKind::Simple => curr / prev - 1.0,
            }),
            _ => None,
        };
        out.push(r);
    }
    out
}

/// Simple return over `periods` sessions: P_t / P_{t-periods} - 1.
pub fn horizon_returns(closes: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|t| {
            if periods == 0 || t < periods {
                return None;
            }
            match (closes[t - periods], closes[t]) {
                (Some(start), Some(end)) if start > 0.0 => Some(end / start - 1.0),
                _ => None,
            }
        })
        .collect()
}
