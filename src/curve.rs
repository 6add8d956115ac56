// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve definitions and step evaluation.
//!
//! A curve maps temperature readings to a drive percentage (0-100).
//! Readings are bucketed into bands by ascending thresholds; there is no
//! interpolation between points. Anything below the first threshold maps
//! to the floor level (0%).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Drive level used below the lowest threshold.
pub const FLOOR_PERCENT: u8 = 0;

/// A single threshold on a fan curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    /// Temperature threshold in degrees Celsius
    pub temp_c: f64,
    /// Drive percentage (0-100) applied once the threshold is reached
    pub percent: u8,
}

/// Whether a reading exactly on a threshold belongs to that threshold's band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// `temp >= threshold` enters the band.
    #[default]
    Inclusive,
    /// `temp > threshold` enters the band.
    Exclusive,
}

impl Boundary {
    fn reached(self, temp_c: f64, threshold: f64) -> bool {
        match self {
            Boundary::Inclusive => temp_c >= threshold,
            Boundary::Exclusive => temp_c > threshold,
        }
    }
}

impl FromStr for Boundary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inclusive" => Ok(Boundary::Inclusive),
            "exclusive" => Ok(Boundary::Exclusive),
            other => Err(Error::InvalidCurve(format!(
                "unknown boundary policy '{other}' (expected inclusive or exclusive)"
            ))),
        }
    }
}

/// A named step curve with an ordered list of threshold-to-percent points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanCurve {
    /// Name for this curve, shown in the startup log
    pub name: String,
    /// Points sorted by ascending temperature.
    pub points: Vec<CurvePoint>,
    /// How readings equal to a threshold are classified.
    #[serde(default)]
    pub boundary: Boundary,
}

impl FanCurve {
    /// Create a new fan curve. Points are sorted by temperature automatically.
    pub fn new(name: impl Into<String>, mut points: Vec<CurvePoint>, boundary: Boundary) -> Self {
        points.sort_by(|a, b| a.temp_c.total_cmp(&b.temp_c));
        Self {
            name: name.into(),
            points,
            boundary,
        }
    }

    /// Same curve with a different boundary policy.
    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Drive percentage for a given temperature.
    ///
    /// Returns the level of the highest threshold the reading has reached,
    /// or [`FLOOR_PERCENT`] below every threshold. Out-of-range readings
    /// fall into the nearest band; NaN matches no threshold.
    pub fn evaluate(&self, temp_c: f64) -> u8 {
        self.points
            .iter()
            .rev()
            .find(|p| self.boundary.reached(temp_c, p.temp_c))
            .map_or(FLOOR_PERCENT, |p| p.percent)
    }

    /// Validate the curve: at least one point, finite and strictly
    /// increasing thresholds, levels within 0-100 that never decrease.
    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(Error::InvalidCurve(format!(
                "curve '{}' must have at least 1 point",
                self.name
            )));
        }
        for (i, p) in self.points.iter().enumerate() {
            if !p.temp_c.is_finite() {
                return Err(Error::InvalidCurve(format!(
                    "threshold of point {i} is not a finite temperature"
                )));
            }
            if p.percent > 100 {
                return Err(Error::InvalidCurve(format!(
                    "point {i} drive level {}% exceeds 100%",
                    p.percent
                )));
            }
            if i > 0 {
                let prev = &self.points[i - 1];
                if p.temp_c <= prev.temp_c {
                    return Err(Error::InvalidCurve(format!(
                        "points must have strictly increasing temperatures (point {i})"
                    )));
                }
                if p.percent < prev.percent {
                    return Err(Error::InvalidCurve(format!(
                        "drive level must not drop as temperature rises (point {i})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse a `TEMP:PERCENT,TEMP:PERCENT,...` point list into a validated curve.
    pub fn parse(name: impl Into<String>, spec: &str, boundary: Boundary) -> Result<Self> {
        let points = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_point)
            .collect::<Result<Vec<_>>>()?;
        let curve = FanCurve::new(name, points, boundary);
        curve.validate()?;
        Ok(curve)
    }
}

impl fmt::Display for FanCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.boundary {
            Boundary::Inclusive => ">=",
            Boundary::Exclusive => ">",
        };
        write!(f, "{} [<first: {FLOOR_PERCENT}%", self.name)?;
        for p in &self.points {
            write!(f, ", {op}{}: {}%", p.temp_c, p.percent)?;
        }
        write!(f, "]")
    }
}

fn parse_point(s: &str) -> Result<CurvePoint> {
    let (t, p) = s
        .split_once(':')
        .ok_or_else(|| Error::InvalidCurve(format!("point '{s}' is not TEMP:PERCENT")))?;
    let temp_c = t
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::InvalidCurve(format!("bad temperature in '{s}': {e}")))?;
    let percent = p
        .trim()
        .trim_end_matches('%')
        .parse::<u8>()
        .map_err(|e| Error::InvalidCurve(format!("bad percentage in '{s}': {e}")))?;
    Ok(CurvePoint { temp_c, percent })
}

/// Off below 50C, then 40/70/100% at 50/60/70C. Readings on a threshold
/// enter the hotter band.
pub fn standard_curve() -> FanCurve {
    FanCurve::new(
        "standard",
        vec![
            CurvePoint { temp_c: 50.0, percent: 40 },
            CurvePoint { temp_c: 60.0, percent: 70 },
            CurvePoint { temp_c: 70.0, percent: 100 },
        ],
        Boundary::Inclusive,
    )
}

/// Finer steps starting at 45C. A reading must exceed a threshold to
/// enter its band.
pub fn gradual_curve() -> FanCurve {
    FanCurve::new(
        "gradual",
        vec![
            CurvePoint { temp_c: 45.0, percent: 25 },
            CurvePoint { temp_c: 50.0, percent: 50 },
            CurvePoint { temp_c: 60.0, percent: 80 },
            CurvePoint { temp_c: 70.0, percent: 100 },
        ],
        Boundary::Exclusive,
    )
}
