//! Render-ready fundamental diagram: overlay regions, coloured points and
//! axis layout, serialized as JSON for an external plotting front end.

use serde::Serialize;

use crate::classify::{Classification, PointState, classify};
use crate::config::ClassifierConfig;
use crate::region::{PLOT_RANGE, PlotRange, RegionPolygon, build_regions};
use crate::record::Record;

pub const TITLE: &str = "Speed-Occupancy Fundamental Diagram";
pub const MARKER_SIZE: u32 = 10;
pub const CURRENT_OPACITY: f64 = 0.9;
pub const OTHER_OPACITY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub x_title: &'static str,
    pub y_title: &'static str,
    pub range: PlotRange,
    pub height: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            x_title: "Occupancy (%)",
            y_title: "Speed (km/h)",
            range: PLOT_RANGE,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub occupancy: f64,
    pub speed: f64,
    pub state: PointState,
    pub streak: u32,
    pub colour: &'static str,
    pub size: u32,
    pub opacity: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagram {
    pub title: &'static str,
    pub layout: Layout,
    pub regions: Vec<RegionPolygon>,
    pub points: Vec<Marker>,
    #[serde(skip)]
    pub classification: Classification,
}

impl Diagram {
    /// Classifies `records` and lays them out over the threshold regions.
    ///
    /// The point whose source index equals `current` is drawn more opaque
    /// and labelled `Point N` (1-based).
    pub fn build(records: &[Record], config: &ClassifierConfig, current: Option<usize>) -> Self {
        let classification = classify(records, config);
        let points = classification
            .points
            .iter()
            .map(|p| {
                let is_current = current == Some(p.index);
                Marker {
                    occupancy: p.occupancy,
                    speed: p.speed,
                    state: p.state,
                    streak: p.streak,
                    colour: p.state.colour(),
                    size: MARKER_SIZE,
                    opacity: if is_current {
                        CURRENT_OPACITY
                    } else {
                        OTHER_OPACITY
                    },
                    label: is_current.then(|| format!("Point {}", p.index + 1)),
                }
            })
            .collect();

        Self {
            title: TITLE,
            layout: Layout::default(),
            regions: build_regions(config),
            points,
            classification,
        }
    }
}
