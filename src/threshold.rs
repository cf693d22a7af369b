use tracing::{info, warn};

use crate::model::{Direction, EvaluationState, NotificationAttempt, ThresholdSet};
use crate::notifier::Notifier;

/// Result of sending one triggered notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertOutcome {
    pub attempt: NotificationAttempt,
    pub delivered: bool,
}

/// Output of a single evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: EvaluationState,
    pub outcomes: Vec<AlertOutcome>,
    /// `true` when there was no prior price and nothing was compared.
    pub first_run: bool,
}

impl Evaluation {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.delivered).count()
    }
}

/// Compare `price` against every armed threshold and notify on crossings.
///
/// Each (level, direction) pair fires at most once over the lifetime of the
/// state: a level is recorded as alerted only after the notifier reports
/// success, and recorded levels are never compared again. `below` levels are
/// visited highest first, `above` levels lowest first. Crossings are strict.
///
/// With no previous price the observation is recorded and nothing fires.
pub async fn evaluate(
    price: f64,
    thresholds: &ThresholdSet,
    mut state: EvaluationState,
    notifier: &dyn Notifier,
) -> Evaluation {
    if state.last_price.is_none() {
        info!(price, "first observation, recording price without alerting");
        state.last_price = Some(price);
        return Evaluation {
            state,
            outcomes: Vec::new(),
            first_run: true,
        };
    }

    let mut outcomes = Vec::new();

    let below = thresholds.below_descending();
    let above = thresholds.above_ascending();
    let candidates = below
        .into_iter()
        .map(|level| (Direction::Below, level))
        .chain(above.into_iter().map(|level| (Direction::Above, level)));

    for (direction, level) in candidates {
        if state.is_alerted(direction, level) || !is_crossed(direction, level, price) {
            continue;
        }

        info!(%direction, threshold = level, price, "threshold crossed");
        let attempt = NotificationAttempt::crossing(direction, level, price);
        let delivered = notifier.send(&attempt).await;

        if delivered {
            state.mark_alerted(direction, level);
            info!(%direction, threshold = level, price, "alert sent");
        } else {
            warn!(
                %direction,
                threshold = level,
                price,
                "alert delivery failed, threshold stays armed"
            );
        }
        outcomes.push(AlertOutcome { attempt, delivered });
    }

    state.last_price = Some(price);

    Evaluation {
        state,
        outcomes,
        first_run: false,
    }
}

fn is_crossed(direction: Direction, level: f64, price: f64) -> bool {
    match direction {
        Direction::Below => price < level,
        Direction::Above => price > level,
        Direction::Test => false,
    }
}
