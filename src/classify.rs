//! Per-record activation/deactivation classification.
//!
//! A single left-to-right pass over the records. Activation is tested
//! first; deactivation only when activation does not hold. Consecutive
//! activating records build a streak, and the record at which the streak
//! reaches `consecutive_intervals` (and every later one in the run) is a
//! full activation.

use serde::Serialize;

use crate::config::{ClassifierConfig, ThresholdPair};
use crate::error::RecordError;
use crate::record::Record;

/// Classification of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointState {
    None,
    PartialActivation,
    FullActivation,
    Deactivation,
}

impl PointState {
    pub fn is_activating(self) -> bool {
        matches!(self, PointState::PartialActivation | PointState::FullActivation)
    }

    /// Marker colour in the diagram. `None` and `Deactivation` share green.
    pub fn colour(self) -> &'static str {
        match self {
            PointState::PartialActivation => "yellow",
            PointState::FullActivation => "red",
            PointState::Deactivation | PointState::None => "green",
        }
    }
}

/// A record with its classification and the activation streak after it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifiedPoint {
    /// Position of the source record in the classified slice.
    pub index: usize,
    pub occupancy: f64,
    pub speed: f64,
    pub state: PointState,
    pub streak: u32,
}

/// Output of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    pub points: Vec<ClassifiedPoint>,
    pub rejected: Vec<RecordError>,
}

/// Number of points in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub none: usize,
    pub partial_activation: usize,
    pub full_activation: usize,
    pub deactivation: usize,
}

impl Classification {
    pub fn states(&self) -> Vec<PointState> {
        self.points.iter().map(|p| p.state).collect()
    }

    pub fn last(&self) -> Option<&ClassifiedPoint> {
        self.points.last()
    }

    pub fn max_streak(&self) -> u32 {
        self.points.iter().map(|p| p.streak).max().unwrap_or(0)
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for point in &self.points {
            match point.state {
                PointState::None => counts.none += 1,
                PointState::PartialActivation => counts.partial_activation += 1,
                PointState::FullActivation => counts.full_activation += 1,
                PointState::Deactivation => counts.deactivation += 1,
            }
        }
        counts
    }
}

fn activates(config: &ClassifierConfig, speed: f64, occupancy: f64) -> bool {
    let ThresholdPair {
        speed: s,
        occupancy: o,
    } = config.activation;
    config.activation_logic.combine(speed <= s, occupancy >= o)
}

fn deactivates(config: &ClassifierConfig, speed: f64, occupancy: f64) -> bool {
    let ThresholdPair {
        speed: s,
        occupancy: o,
    } = config.deactivation;
    config.deactivation_logic.combine(speed >= s, occupancy <= o)
}

/// Classifies `records` in order under `config`.
///
/// Records with a non-finite speed or occupancy are returned in
/// `rejected` and do not touch the streak.
pub fn classify(records: &[Record], config: &ClassifierConfig) -> Classification {
    classify_points(
        records.iter().map(|r| (r.speed, r.occupancy)),
        config,
    )
}

/// Same as [`classify`] over bare `(speed, occupancy)` pairs.
pub fn classify_points<I>(points: I, config: &ClassifierConfig) -> Classification
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut out = Classification::default();
    let mut streak: u32 = 0;

    for (index, (speed, occupancy)) in points.into_iter().enumerate() {
        if !speed.is_finite() {
            out.rejected
                .push(RecordError::invalid(index, "speed", speed.to_string()));
            continue;
        }
        if !occupancy.is_finite() {
            out.rejected
                .push(RecordError::invalid(index, "occupancy", occupancy.to_string()));
            continue;
        }

        let state = if activates(config, speed, occupancy) {
            streak = streak.saturating_add(1);
            if streak >= config.consecutive_intervals {
                PointState::FullActivation
            } else {
                PointState::PartialActivation
            }
        } else if deactivates(config, speed, occupancy) {
            streak = 0;
            PointState::Deactivation
        } else {
            streak = 0;
            PointState::None
        };

        out.points.push(ClassifiedPoint {
            index,
            occupancy,
            speed,
            state,
            streak,
        });
    }

    out
}
