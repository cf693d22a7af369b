use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of a threshold crossing.
///
/// `Test` never comes out of the evaluator; it is only used for the manual
/// test notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Below,
    Above,
    Test,
}

impl Direction {
    /// Parse a CLI/config string into a crossing direction.
    ///
    /// Only `"below"` and `"above"` are accepted; `Test` is not a threshold
    /// direction.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "below" => Some(Self::Below),
            "above" => Some(Self::Above),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::Above => "above",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical two-list threshold configuration.
///
/// Lists may contain duplicates as written by the operator; the sorted
/// accessors collapse them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(default)]
    pub below: Vec<f64>,
    #[serde(default)]
    pub above: Vec<f64>,
}

impl ThresholdSet {
    /// Map the legacy flat list onto the two-list shape (below only).
    pub fn from_flat(levels: Vec<f64>) -> Self {
        Self {
            below: levels,
            above: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.below.is_empty() && self.above.is_empty()
    }

    /// Distinct `below` levels, highest first.
    pub fn below_descending(&self) -> Vec<f64> {
        let mut levels = sorted_distinct(&self.below);
        levels.reverse();
        levels
    }

    /// Distinct `above` levels, lowest first.
    pub fn above_ascending(&self) -> Vec<f64> {
        sorted_distinct(&self.above)
    }

    /// Add a level. Returns `false` if it was already present.
    pub fn insert(&mut self, direction: Direction, level: f64) -> bool {
        let Some(levels) = self.levels_mut(direction) else {
            return false;
        };
        if levels.contains(&level) {
            return false;
        }
        levels.push(level);
        true
    }

    /// Remove every occurrence of a level. Returns `false` if it was absent.
    pub fn remove(&mut self, direction: Direction, level: f64) -> bool {
        let Some(levels) = self.levels_mut(direction) else {
            return false;
        };
        let before = levels.len();
        levels.retain(|l| *l != level);
        levels.len() != before
    }

    /// The same set with both lists deduplicated and in evaluation order.
    pub fn normalized(&self) -> Self {
        Self {
            below: self.below_descending(),
            above: self.above_ascending(),
        }
    }

    fn levels_mut(&mut self, direction: Direction) -> Option<&mut Vec<f64>> {
        match direction {
            Direction::Below => Some(&mut self.below),
            Direction::Above => Some(&mut self.above),
            Direction::Test => None,
        }
    }
}

fn sorted_distinct(levels: &[f64]) -> Vec<f64> {
    let mut out = levels.to_vec();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

/// State carried between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationState {
    pub last_price: Option<f64>,
    #[serde(default)]
    pub alerted_below: Vec<f64>,
    #[serde(default)]
    pub alerted_above: Vec<f64>,
    /// Written by the below-only revision of the state document.
    #[serde(default, rename = "alerted_thresholds", skip_serializing)]
    legacy_alerted: Vec<f64>,
}

impl EvaluationState {
    #[cfg(test)]
    pub fn with_last_price(price: f64) -> Self {
        Self {
            last_price: Some(price),
            ..Default::default()
        }
    }

    pub fn is_alerted(&self, direction: Direction, level: f64) -> bool {
        match direction {
            Direction::Below => self.alerted_below.contains(&level),
            Direction::Above => self.alerted_above.contains(&level),
            Direction::Test => false,
        }
    }

    pub fn mark_alerted(&mut self, direction: Direction, level: f64) {
        let levels = match direction {
            Direction::Below => &mut self.alerted_below,
            Direction::Above => &mut self.alerted_above,
            Direction::Test => return,
        };
        if !levels.contains(&level) {
            levels.push(level);
        }
    }

    /// Fold legacy `alerted_thresholds` entries into `alerted_below`.
    pub fn migrate_legacy(mut self) -> Self {
        for level in std::mem::take(&mut self.legacy_alerted) {
            self.mark_alerted(Direction::Below, level);
        }
        self
    }
}

/// Display labels used when rendering notification text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLabels {
    pub asset: String,
    pub currency: String,
}

/// Subject and body handed to a delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// A single notification the evaluator (or the operator) asks the sink to send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotificationAttempt {
    pub direction: Direction,
    pub threshold: f64,
    pub price: f64,
}

impl NotificationAttempt {
    pub fn crossing(direction: Direction, threshold: f64, price: f64) -> Self {
        Self {
            direction,
            threshold,
            price,
        }
    }

    pub fn test(price: f64) -> Self {
        Self {
            direction: Direction::Test,
            threshold: price,
            price,
        }
    }

    pub fn render(&self, labels: &AssetLabels) -> Message {
        let AssetLabels { asset, currency } = labels;
        let (threshold, price) = (self.threshold, self.price);
        match self.direction {
            Direction::Below => Message {
                subject: format!("{asset} alert: price below {threshold:.0} {currency}"),
                body: format!(
                    "⚠️ {asset} alert: price fell below {threshold:.0} {currency}!\n\
                     Current price: {price:.2} {currency}"
                ),
            },
            Direction::Above => Message {
                subject: format!("{asset} alert: price above {threshold:.0} {currency}"),
                body: format!(
                    "📈 {asset} alert: price rose above {threshold:.0} {currency}!\n\
                     Current price: {price:.2} {currency}"
                ),
            },
            Direction::Test => Message {
                subject: format!("{asset} alert: test notification"),
                body: format!(
                    "✅ Test notification\n\
                     Current {} price: {price:.2} {currency}\n\
                     The system is working!",
                    asset.to_lowercase()
                ),
            },
        }
    }
}

/// One daily observation for the history view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}
