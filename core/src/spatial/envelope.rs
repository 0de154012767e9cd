use crate::prelude::EnmResult;
use crate::spatial::SpatialReference;

/// Samples per edge when an envelope is pushed through a projection.
const EDGE_SAMPLES: usize = 21;

/// Axis-aligned bounding rectangle tagged with its spatial reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srs: SpatialReference,
}

impl Envelope {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, srs: SpatialReference) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
            srs,
        }
    }

    pub fn from_point(x: f64, y: f64, srs: SpatialReference) -> Self {
        Self::new(x, y, x, y, srs)
    }

    pub fn expand_to_include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Same reference and corners within `tolerance` of each other.
    pub fn equals(&self, other: &Envelope, tolerance: f64) -> bool {
        self.srs.is_same(&other.srs)
            && (self.min_x - other.min_x).abs() <= tolerance
            && (self.min_y - other.min_y).abs() <= tolerance
            && (self.max_x - other.max_x).abs() <= tolerance
            && (self.max_y - other.max_y).abs() <= tolerance
    }

    /// Overlap of two envelopes in the same reference, `None` when disjoint.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x.min(other.max_x);
        let max_y = self.max_y.min(other.max_y);
        if min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Envelope {
            min_x,
            min_y,
            max_x,
            max_y,
            srs: self.srs,
        })
    }

    /// Reprojects the rectangle by sampling along each edge; the result is the
    /// bounding box of the projected samples.
    pub fn transform_to(&self, target: &SpatialReference) -> EnmResult<Envelope> {
        if self.srs.is_same(target) {
            return Ok(*self);
        }

        let (x0, y0) = self.srs.transform_point(target, self.min_x, self.min_y)?;
        let mut projected = Envelope::from_point(x0, y0, *target);
        for step in 0..EDGE_SAMPLES {
            let t = step as f64 / (EDGE_SAMPLES - 1) as f64;
            let x = self.min_x + t * self.width();
            let y = self.min_y + t * self.height();
            for (px, py) in [
                (x, self.min_y),
                (x, self.max_y),
                (self.min_x, y),
                (self.max_x, y),
            ] {
                let (tx, ty) = self.srs.transform_point(target, px, py)?;
                projected.expand_to_include(tx, ty);
            }
        }
        Ok(projected)
    }
}
