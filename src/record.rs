use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One detector interval: when it was measured, mean speed (km/h),
/// occupancy (%) and optionally flow and the reporting detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub datetime: NaiveDateTime,
    pub speed: f64,
    pub occupancy: f64,
    pub flow: Option<f64>,
    pub detector: Option<String>,
}

impl Record {
    pub fn new(datetime: NaiveDateTime, speed: f64, occupancy: f64) -> Self {
        Self {
            datetime,
            speed,
            occupancy,
            flow: None,
            detector: None,
        }
    }

    pub fn with_flow(mut self, flow: f64) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detector = Some(detector.to_string());
        self
    }
}
