use crate::Vector;
use crate::geom::EPS;
use std::fmt;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns true if both points are very close to each other.
    pub fn is_close(&self, other: &Self) -> bool {
        (self.x - other.x).abs() < EPS
            && (self.y - other.y).abs() < EPS
            && (self.z - other.z).abs() < EPS
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Swaps coordinate axes; `perm[i]` names the source axis of output axis `i`.
    pub fn permute(&self, perm: [usize; 3]) -> Self {
        let c = [self.x, self.y, self.z];
        Self::new(c[perm[0]], c[perm[1]], c[perm[2]])
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(2); // Default 2 decimals
        write!(
            f,
            "Point({:.prec$}, {:.prec$}, {:.prec$})",
            self.x,
            self.y,
            self.z,
            prec = prec
        )
    }
}

// Implement +
impl Add<Vector> for Point {
    type Output = Point;
    fn add(self, other: Vector) -> Self {
        Self {
            x: self.x + other.dx,
            y: self.y + other.dy,
            z: self.z + other.dz,
        }
    }
}

// Implement -
impl Sub for Point {
    type Output = Vector;
    fn sub(self, other: Self) -> Vector {
        Vector::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_close() {
        let pa = Point::new(5., 5., 5.);
        let pb = Point::new(5.00000000000001, 5., 5.);
        let pc = Point::new(5.0001, 5., 5.);
        assert!(pa.is_close(&pb));
        assert!(!pa.is_close(&pc));
    }

    #[test]
    fn test_sub_gives_edge_vector() {
        let a = Point::new(3., 2., -1.);
        let b = Point::new(4., -7., -2.);
        let e = b - a;
        assert_eq!(e, Vector::new(1., -9., -1.));
        assert!((a + e).is_close(&b));
    }

    #[test]
    fn test_permute() {
        let p = Point::new(1., 2., 3.);
        assert_eq!(p.permute([2, 0, 1]), Point::new(3., 1., 2.));
        assert!(!Point::new(f64::NAN, 0., 0.).is_finite());
    }
}
