use crate::errors::{JobError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

pub type JobId = Uuid;

const MAX_RADIUS_METERS: f64 = 5000.0;
const MIN_POLYGON_POINTS: usize = 3;
const MAX_POLYGON_POINTS: usize = 1000;
const MAX_LAYERS: usize = 32;
const MAX_LAYER_NAME_LEN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Circle,
    Polygon,
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::Circle
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Circle => write!(f, "circle"),
            SelectionMode::Polygon => write!(f, "polygon"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    Local,
    Utm,
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Utm
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Local => write!(f, "local"),
            Projection::Utm => write!(f, "utm"),
        }
    }
}

/// A DXF export request: the area to fetch from OpenStreetMap and how to render it.
///
/// Parameters are immutable once a job is created. The orchestrator does not interpret them beyond
/// [`JobParameters::validate`] and mapping them onto worker arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    pub lat: f64,
    pub lon: f64,
    /// Radius of the selection in metres.
    pub radius: f64,
    #[serde(default)]
    pub selection_mode: SelectionMode,
    /// `[lat, lon]` vertices, only used with `SelectionMode::Polygon`.
    #[serde(default)]
    pub polygon: Vec<[f64; 2]>,
    #[serde(default)]
    pub projection: Projection,
    #[serde(default)]
    pub layers: Vec<String>,
}

impl JobParameters {
    pub fn circle(lat: f64, lon: f64, radius: f64) -> Self {
        Self {
            lat,
            lon,
            radius,
            selection_mode: SelectionMode::Circle,
            polygon: Vec::new(),
            projection: Projection::default(),
            layers: Vec::new(),
        }
    }

    /// Reject requests the worker should never see.
    pub fn validate(&self) -> Result<()> {
        check_coordinate(self.lat, self.lon)?;
        if !self.radius.is_finite() || self.radius <= 0.0 || self.radius > MAX_RADIUS_METERS {
            return Err(JobError::Validation(format!(
                "radius must be in (0, {}] metres, got {}",
                MAX_RADIUS_METERS, self.radius
            )));
        }
        if self.selection_mode == SelectionMode::Polygon {
            let points = self.polygon.len();
            if !(MIN_POLYGON_POINTS..=MAX_POLYGON_POINTS).contains(&points) {
                return Err(JobError::Validation(format!(
                    "polygon needs {}..={} points, got {}",
                    MIN_POLYGON_POINTS, MAX_POLYGON_POINTS, points
                )));
            }
            for [lat, lon] in &self.polygon {
                check_coordinate(*lat, *lon)?;
            }
        }
        if self.layers.len() > MAX_LAYERS {
            return Err(JobError::Validation(format!(
                "at most {} layers may be requested, got {}",
                MAX_LAYERS,
                self.layers.len()
            )));
        }
        if let Some(bad) = self
            .layers
            .iter()
            .find(|layer| layer.trim().is_empty() || layer.len() > MAX_LAYER_NAME_LEN)
        {
            return Err(JobError::Validation(format!("invalid layer name {:?}", bad)));
        }
        Ok(())
    }

    /// Map the request onto the worker's command line flags.
    pub fn to_args(&self, output: &Path) -> Vec<String> {
        let mut args = vec![
            "--lat".to_string(),
            self.lat.to_string(),
            "--lon".to_string(),
            self.lon.to_string(),
            "--radius".to_string(),
            self.radius.to_string(),
            "--selection-mode".to_string(),
            self.selection_mode.to_string(),
            "--projection".to_string(),
            self.projection.to_string(),
            "--output".to_string(),
            output.display().to_string(),
        ];
        if self.selection_mode == SelectionMode::Polygon {
            args.push("--polygon".to_string());
            // serializing a Vec<[f64; 2]> cannot fail
            args.push(serde_json::to_string(&self.polygon).unwrap_or_default());
        }
        if !self.layers.is_empty() {
            args.push("--layers".to_string());
            args.push(self.layers.join(","));
        }
        args
    }
}

fn check_coordinate(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(JobError::Validation(format!(
            "latitude must be within [-90, 90], got {}",
            lat
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(JobError::Validation(format!(
            "longitude must be within [-180, 180], got {}",
            lon
        )));
    }
    Ok(())
}
