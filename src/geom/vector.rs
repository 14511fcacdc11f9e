use crate::Point;
use crate::geom::EPS;
use std::fmt;
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Vector {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    pub fn from_points(beg: Point, end: Point) -> Self {
        end - beg
    }

    /// Cross product between 2 vectors.
    pub fn cross(self, other: Self) -> Self {
        Self {
            dx: self.dy * other.dz - self.dz * other.dy,
            dy: self.dz * other.dx - self.dx * other.dz,
            dz: self.dx * other.dy - self.dy * other.dx,
        }
    }

    /// Dot product between 2 vectors.
    pub fn dot(self, other: Self) -> f64 {
        self.dx * other.dx + self.dy * other.dy + self.dz * other.dz
    }

    /// Returns the length of the vector.
    pub fn length(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy + self.dz * self.dz).sqrt()
    }

    pub fn is_close(&self, other: &Self) -> bool {
        (self.dx - other.dx).abs() < EPS
            && (self.dy - other.dy).abs() < EPS
            && (self.dz - other.dz).abs() < EPS
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dz.is_finite()
    }

    /// Normalizes the vector (divides by its length) and returns a copy.
    pub fn normalize(&self) -> Option<Self> {
        let len = self.length();
        if len < EPS {
            None
        } else {
            Some(Self {
                dx: self.dx / len,
                dy: self.dy / len,
                dz: self.dz / len,
            })
        }
    }

    /// Calculates vector normal to the surface defined with 3 points.
    ///
    /// If the normal does not exist, returns None.
    /// The normal does not exist if the points are collinear.
    pub fn normal(pt0: Point, pt1: Point, pt2: Point) -> Option<Self> {
        (pt1 - pt0).cross(pt2 - pt0).normalize()
    }

    /// Swaps components; `perm[i]` names the source axis of output axis `i`.
    pub fn permute(&self, perm: [usize; 3]) -> Self {
        let c = [self.dx, self.dy, self.dz];
        Self::new(c[perm[0]], c[perm[1]], c[perm[2]])
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(2); // Default 2 decimals
        write!(
            f,
            "Vector({:.prec$}, {:.prec$}, {:.prec$})",
            self.dx,
            self.dy,
            self.dz,
            prec = prec
        )
    }
}

// Implement +
impl Add for Vector {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            dx: self.dx + other.dx,
            dy: self.dy + other.dy,
            dz: self.dz + other.dz,
        }
    }
}

// Implement -
impl Sub for Vector {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            dx: self.dx - other.dx,
            dy: self.dy - other.dy,
            dz: self.dz - other.dz,
        }
    }
}

// Implement *
impl Mul<f64> for Vector {
    type Output = Self;
    fn mul(self, other: f64) -> Self {
        Self {
            dx: self.dx * other,
            dy: self.dy * other,
            dz: self.dz * other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let p0 = Point::new(1., 1., 1.);
        let p1 = Point::new(0., 0., 0.);
        let va = Vector::from_points(p0, p1);
        let vb = Vector::from_points(p1, p0);
        assert_eq!(va, vb * -1.);
    }

    #[test]
    fn test_cross() {
        let vx = Vector::new(1., 0., 0.);
        let vy = Vector::new(0., 1., 0.);
        let v_cross = vx.cross(vy);
        assert_eq!(v_cross, Vector::new(0., 0., 1.));
        assert_eq!(v_cross.length(), 1.);
    }

    #[test]
    fn test_normalize() {
        let v = Vector::new(9., 0., 0.);
        assert_eq!(v.normalize(), Some(Vector::new(1., 0., 0.)));
        assert!(Vector::new(0., 0., 0.).normalize().is_none());
    }

    #[test]
    fn test_normal() {
        let p0 = Point::new(1., 0., 0.);
        let p1 = Point::new(1., 1., 0.);
        let p2 = Point::new(0., 1., 0.);
        let vn = Vector::normal(p0, p1, p2).unwrap();
        assert!(vn.is_close(&Vector::new(0., 0., 1.)));
    }
}
