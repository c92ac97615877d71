//! Background overlay polygons in (occupancy, speed) space.
//!
//! Polygons are built against a logical plane of `[0, 100] x [0, 100]`,
//! while the plot itself only shows occupancy up to 75.

use serde::Serialize;

use crate::config::{ClassifierConfig, LogicMode};

pub const MAX_OCCUPANCY: f64 = 100.0;
pub const MAX_SPEED: f64 = 100.0;

pub const ACTIVATION_FILL: &str = "rgba(255, 0, 0, 1)";
pub const DEACTIVATION_FILL: &str = "rgba(0, 255, 0, 1)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Activation,
    Deactivation,
}

/// An `(occupancy, speed)` vertex.
pub type Vertex = (f64, f64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPolygon {
    pub kind: RegionKind,
    pub logic: LogicMode,
    pub vertices: Vec<Vertex>,
    pub fill: &'static str,
    /// Legend entry; `None` for polygons that share an entry with a sibling.
    pub label: Option<String>,
}

impl RegionPolygon {
    fn new(kind: RegionKind, logic: LogicMode, vertices: Vec<Vertex>, legend: bool) -> Self {
        let (fill, name) = match kind {
            RegionKind::Activation => (ACTIVATION_FILL, "Activation Region"),
            RegionKind::Deactivation => (DEACTIVATION_FILL, "Deactivation Region"),
        };
        Self {
            kind,
            logic,
            vertices,
            fill,
            label: legend.then(|| format!("{name} ({logic})")),
        }
    }

    /// Vertex x-coordinates (occupancy), in order.
    pub fn xs(&self) -> Vec<f64> {
        self.vertices.iter().map(|v| v.0).collect()
    }

    /// Vertex y-coordinates (speed), in order.
    pub fn ys(&self) -> Vec<f64> {
        self.vertices.iter().map(|v| v.1).collect()
    }
}

/// Visible axis ranges of the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotRange {
    pub occupancy: (f64, f64),
    pub speed: (f64, f64),
}

pub const PLOT_RANGE: PlotRange = PlotRange {
    occupancy: (0.0, 75.0),
    speed: (0.0, 100.0),
};

pub fn activation_regions(config: &ClassifierConfig) -> Vec<RegionPolygon> {
    let occ = config.activation.occupancy;
    let spd = config.activation.speed;
    let vertices = match config.activation_logic {
        LogicMode::And => vec![(occ, 0.0), (MAX_OCCUPANCY, 0.0), (MAX_OCCUPANCY, spd), (occ, spd)],
        LogicMode::Or => vec![
            (0.0, 0.0),
            (MAX_OCCUPANCY, 0.0),
            (MAX_OCCUPANCY, MAX_SPEED),
            (occ, MAX_SPEED),
            (occ, spd),
            (0.0, spd),
        ],
    };
    vec![RegionPolygon::new(
        RegionKind::Activation,
        config.activation_logic,
        vertices,
        true,
    )]
}

pub fn deactivation_regions(config: &ClassifierConfig) -> Vec<RegionPolygon> {
    let occ = config.deactivation.occupancy;
    let spd = config.deactivation.speed;
    let logic = config.deactivation_logic;
    match logic {
        LogicMode::And => vec![RegionPolygon::new(
            RegionKind::Deactivation,
            logic,
            vec![(0.0, spd), (occ, spd), (occ, MAX_SPEED), (0.0, MAX_SPEED)],
            true,
        )],
        LogicMode::Or => vec![
            // speed band across every occupancy
            RegionPolygon::new(
                RegionKind::Deactivation,
                logic,
                vec![(0.0, spd), (MAX_OCCUPANCY, spd), (MAX_OCCUPANCY, MAX_SPEED), (0.0, MAX_SPEED)],
                true,
            ),
            // occupancy band across every speed
            RegionPolygon::new(
                RegionKind::Deactivation,
                logic,
                vec![(0.0, 0.0), (occ, 0.0), (occ, MAX_SPEED), (0.0, MAX_SPEED)],
                false,
            ),
        ],
    }
}

/// All overlay polygons in draw order: activation first, then deactivation.
pub fn build_regions(config: &ClassifierConfig) -> Vec<RegionPolygon> {
    let mut regions = activation_regions(config);
    regions.extend(deactivation_regions(config));
    regions
}
