//! Geometry capability consumed by strategies.
//!
//! The engine never computes geometry itself; it drives a backend through
//! these traits. Backends live outside this crate.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Shared handle to a geometry. Records alias geometries freely.
pub type SharedGeometry = Rc<dyn Geometry>;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Build a box from two corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Closed-interval intersection test; touching boxes intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(Bounds {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow (or shrink, for negative widths) the box on every side.
    pub fn expand(&self, width: f64) -> Bounds {
        Bounds::new(
            self.min_x - width,
            self.min_y - width,
            self.max_x + width,
            self.max_y + width,
        )
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

/// Operations a geometry backend must provide.
pub trait Geometry: fmt::Debug {
    /// Backend access for downcasting the other operand of binary operations.
    fn as_any(&self) -> &dyn Any;

    fn bounds(&self) -> Option<Bounds>;

    /// `None` when valid, otherwise the reason the geometry is invalid.
    fn invalid_reason(&self) -> Option<String>;

    fn is_valid(&self) -> bool {
        self.invalid_reason().is_none()
    }

    fn is_empty(&self) -> bool {
        self.bounds().is_none()
    }

    fn intersects(&self, other: &dyn Geometry) -> bool;
    fn contains(&self, other: &dyn Geometry) -> bool;

    fn disjoint(&self, other: &dyn Geometry) -> bool {
        !self.intersects(other)
    }

    fn overlaps(&self, other: &dyn Geometry) -> bool;
    fn equals(&self, other: &dyn Geometry) -> bool;

    /// Fraction of this geometry's area covered by its intersection with `other`.
    fn intersect_ratio(&self, other: &dyn Geometry) -> f64;

    fn area(&self) -> f64;
    fn buffer(&self, width: f64) -> Result<SharedGeometry>;
    fn union(&self, other: &dyn Geometry) -> Result<SharedGeometry>;
    fn intersection(&self, other: &dyn Geometry) -> Result<SharedGeometry>;
    fn simplify(&self, tolerance: f64) -> Result<SharedGeometry>;
    fn centroid(&self) -> Option<(f64, f64)>;

    /// Number of vertices.
    fn points(&self) -> usize;

    fn to_wkt(&self) -> String;
}

/// Constructs geometries from text sources.
pub trait GeometryFactory {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Parse `source`, interpreted according to `gis_type` (e.g. `wkt`).
    fn create(&self, source: &str, gis_type: &str) -> Result<SharedGeometry>;
}
