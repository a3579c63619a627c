//! Envelope geometry backend.
//!
//! Reduces WKT inputs to their axis-aligned envelope. Overlap ratios, unions
//! and intersections are computed on envelopes, which is exact for
//! rectangular footprints and a conservative estimate otherwise.

use std::any::Any;
use std::rc::Rc;

use miner_types::{Bounds, Geometry, GeometryFactory, MinerError, Result, SharedGeometry};

// ---------------------------------------------------------------------------
// EnvelopeGeometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Point,
    Polygon,
}

#[derive(Debug, Clone)]
pub struct EnvelopeGeometry {
    bounds: Option<Bounds>,
    shape: Shape,
    points: usize,
    invalid: Option<String>,
}

impl EnvelopeGeometry {
    /// A rectangle with a closed five-point ring.
    pub fn rectangle(bounds: Bounds) -> Self {
        Self {
            bounds: Some(bounds),
            shape: Shape::Polygon,
            points: 5,
            invalid: None,
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self {
            bounds: Some(Bounds::point(x, y)),
            shape: Shape::Point,
            points: 1,
            invalid: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            bounds: None,
            shape: Shape::Polygon,
            points: 0,
            invalid: None,
        }
    }

    pub fn shared(self) -> SharedGeometry {
        Rc::new(self)
    }

    pub fn from_bounds(bounds: Option<Bounds>) -> Self {
        match bounds {
            Some(b) if b.width() == 0.0 && b.height() == 0.0 => Self::point(b.min_x, b.min_y),
            Some(b) => Self::rectangle(b),
            None => Self::empty(),
        }
    }

    /// Parse WKT (`POINT`, `POLYGON`, `MULTIPOLYGON`) or `ENVELOPE(minx, maxx, maxy, miny)`.
    pub fn from_wkt(text: &str) -> Result<Self> {
        let text = text.trim();
        let open = text.find('(');
        let tag = text[..open.unwrap_or(text.len())].trim().to_ascii_uppercase();

        if tag.ends_with("EMPTY") {
            return Ok(Self::empty());
        }
        let Some(open) = open else {
            return Err(MinerError::Geometry(format!("unrecognized geometry text: {text}")));
        };

        match tag.as_str() {
            "ENVELOPE" => parse_envelope(&text[open..]),
            "POINT" => {
                let rings = innermost_groups(&text[open..])?;
                let coords = parse_coords(rings.first().copied().unwrap_or_default())?;
                match coords.as_slice() {
                    [(x, y)] => Ok(Self::point(*x, *y)),
                    _ => Err(MinerError::Geometry(format!("POINT needs one coordinate: {text}"))),
                }
            }
            "POLYGON" | "MULTIPOLYGON" => {
                let rings = innermost_groups(&text[open..])?;
                let mut bounds: Option<Bounds> = None;
                let mut points = 0;
                let mut invalid = None;
                for ring in rings {
                    let coords = parse_coords(ring)?;
                    points += coords.len();
                    if invalid.is_none() {
                        invalid = ring_problem(&coords);
                    }
                    for (x, y) in coords {
                        let p = Bounds::point(x, y);
                        bounds = Some(bounds.map_or(p, |b| b.union(&p)));
                    }
                }
                Ok(Self {
                    bounds,
                    shape: Shape::Polygon,
                    points,
                    invalid,
                })
            }
            other => Err(MinerError::Geometry(format!(
                "unsupported geometry type \"{other}\""
            ))),
        }
    }
}

fn ring_problem(coords: &[(f64, f64)]) -> Option<String> {
    if coords.len() < 4 {
        return Some(format!("Too few points in ring ({})", coords.len()));
    }
    if coords.first() != coords.last() {
        return Some("Ring not closed".to_string());
    }
    None
}

/// Text between every innermost pair of parentheses.
fn innermost_groups(text: &str) -> Result<Vec<&str>> {
    let mut groups = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' => {
                depth += 1;
                start = Some(i + 1);
            }
            ')' => {
                depth -= 1;
                if let Some(s) = start.take() {
                    groups.push(&text[s..i]);
                }
            }
            _ => {}
        }
        if depth < 0 {
            return Err(MinerError::Geometry("unbalanced parentheses".into()));
        }
    }
    if depth != 0 {
        return Err(MinerError::Geometry("unbalanced parentheses".into()));
    }
    Ok(groups)
}

fn parse_number(token: &str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| MinerError::Geometry(format!("invalid coordinate value \"{token}\"")))
}

fn parse_coords(ring: &str) -> Result<Vec<(f64, f64)>> {
    ring.split(',')
        .filter(|c| !c.trim().is_empty())
        .map(|c| {
            let parts: Vec<&str> = c.split_whitespace().collect();
            if parts.len() < 2 {
                return Err(MinerError::Geometry(format!("invalid coordinate \"{}\"", c.trim())));
            }
            Ok((parse_number(parts[0])?, parse_number(parts[1])?))
        })
        .collect()
}

fn parse_envelope(body: &str) -> Result<EnvelopeGeometry> {
    let inner = body.trim().trim_start_matches('(').trim_end_matches(')');
    let values = inner
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<f64>>>()?;
    match values.as_slice() {
        [minx, maxx, maxy, miny] => Ok(EnvelopeGeometry::from_bounds(Some(Bounds::new(
            *minx, *miny, *maxx, *maxy,
        )))),
        _ => Err(MinerError::Geometry(
            "ENVELOPE needs four values (minx, maxx, maxy, miny)".into(),
        )),
    }
}

impl Geometry for EnvelopeGeometry {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    fn invalid_reason(&self) -> Option<String> {
        self.invalid.clone()
    }

    fn intersects(&self, other: &dyn Geometry) -> bool {
        match (self.bounds, other.bounds()) {
            (Some(a), Some(b)) => a.intersects(&b),
            _ => false,
        }
    }

    fn contains(&self, other: &dyn Geometry) -> bool {
        match (self.bounds, other.bounds()) {
            (Some(a), Some(b)) => a.contains(&b),
            _ => false,
        }
    }

    fn overlaps(&self, other: &dyn Geometry) -> bool {
        match (self.bounds, other.bounds()) {
            (Some(a), Some(b)) => {
                a.intersection(&b).is_some_and(|i| i.area() > 0.0)
                    && !a.contains(&b)
                    && !b.contains(&a)
            }
            _ => false,
        }
    }

    fn equals(&self, other: &dyn Geometry) -> bool {
        self.bounds == other.bounds()
    }

    fn intersect_ratio(&self, other: &dyn Geometry) -> f64 {
        let (Some(a), Some(b)) = (self.bounds, other.bounds()) else {
            return 0.0;
        };
        let area = a.area();
        if area <= 0.0 {
            return if a.intersects(&b) && self.shape == Shape::Point {
                1.0
            } else {
                0.0
            };
        }
        a.intersection(&b).map_or(0.0, |i| i.area() / area)
    }

    fn area(&self) -> f64 {
        self.bounds.map_or(0.0, |b| b.area())
    }

    fn buffer(&self, width: f64) -> Result<SharedGeometry> {
        let Some(b) = self.bounds else {
            return Ok(Self::empty().shared());
        };
        let grown = b.expand(width);
        if grown.min_x > grown.max_x || grown.min_y > grown.max_y {
            return Ok(Self::empty().shared());
        }
        if width == 0.0 && self.shape == Shape::Point {
            return Ok(Self::point(b.min_x, b.min_y).shared());
        }
        Ok(Self::rectangle(grown).shared())
    }

    fn union(&self, other: &dyn Geometry) -> Result<SharedGeometry> {
        let merged = match (self.bounds, other.bounds()) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        Ok(Self::from_bounds(merged).shared())
    }

    fn intersection(&self, other: &dyn Geometry) -> Result<SharedGeometry> {
        let common = match (self.bounds, other.bounds()) {
            (Some(a), Some(b)) => a.intersection(&b),
            _ => None,
        };
        Ok(Self::from_bounds(common).shared())
    }

    fn simplify(&self, tolerance: f64) -> Result<SharedGeometry> {
        if tolerance <= 0.0 || self.shape == Shape::Point {
            return Ok(self.clone().shared());
        }
        let mut simple = self.clone();
        simple.points = self.points.min(5);
        Ok(simple.shared())
    }

    fn centroid(&self) -> Option<(f64, f64)> {
        self.bounds.map(|b| b.center())
    }

    fn points(&self) -> usize {
        self.points
    }

    fn to_wkt(&self) -> String {
        match (self.bounds, self.shape) {
            (None, _) => "POLYGON EMPTY".to_string(),
            (Some(b), Shape::Point) => format!("POINT ({} {})", b.min_x, b.min_y),
            (Some(b), Shape::Polygon) => format!(
                "POLYGON (({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
                x0 = b.min_x,
                y0 = b.min_y,
                x1 = b.max_x,
                y1 = b.max_y
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvelopeFactory
// ---------------------------------------------------------------------------

/// Default geometry backend for strategies.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeFactory;

impl GeometryFactory for EnvelopeFactory {
    fn name(&self) -> &str {
        "envelope"
    }

    fn create(&self, source: &str, gis_type: &str) -> Result<SharedGeometry> {
        match gis_type.trim().to_ascii_lowercase().as_str() {
            "" | "wkt" => Ok(EnvelopeGeometry::from_wkt(source)?.shared()),
            other => Err(MinerError::Geometry(format!(
                "GisType \"{other}\" is not supported by the envelope backend"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvelopeIndex
// ---------------------------------------------------------------------------

/// Envelope search index backing the `rtree` method.
///
/// This is not a spatial tree: entries are kept sorted by `min_x` and a query
/// scans that list linearly up to the query's `max_x`. Query results come
/// back in insertion order.
#[derive(Debug, Clone)]
pub struct EnvelopeIndex<T> {
    entries: Vec<(Bounds, T)>,
    /// Entry positions ordered by `min_x`.
    by_min_x: Vec<usize>,
}

impl<T: Clone> EnvelopeIndex<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_min_x: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, bounds: Bounds, item: T) {
        let pos = self.entries.len();
        let slot = self
            .by_min_x
            .partition_point(|&i| self.entries[i].0.min_x <= bounds.min_x);
        self.entries.push((bounds, item));
        self.by_min_x.insert(slot, pos);
    }

    pub fn query(&self, bounds: &Bounds) -> Vec<T> {
        let mut hits: Vec<usize> = self
            .by_min_x
            .iter()
            .take_while(|&&i| self.entries[i].0.min_x <= bounds.max_x)
            .filter(|&&i| self.entries[i].0.intersects(bounds))
            .copied()
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| self.entries[i].1.clone()).collect()
    }
}

impl<T: Clone> Default for EnvelopeIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
