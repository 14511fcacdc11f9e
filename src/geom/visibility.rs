//! Ray/triangle visibility test.
//!
//! Möller–Trumbore intersection against a triangle stored as a reference
//! vertex plus two edge vectors, which is exactly the occluder layout kept by
//! [`crate::geom::triangles::TriangleBatch`].

use crate::{Point, Vector};

/// Determinant magnitude below which the ray is treated as parallel to the triangle plane.
pub const PARALLEL_EPS: f64 = 1e-8;

/// Intersects the ray `origin + t * direction` with the triangle
/// `(vertex_a, vertex_a + edge_ba, vertex_a + edge_ca)`.
///
/// Returns the ray parameter `t` of the hit, or `None` when the ray is
/// parallel to the plane or passes outside the triangle. `t` may be negative
/// (hit behind the origin); callers decide which range counts.
pub fn intersect_triangle(
    origin: Point,
    direction: Vector,
    vertex_a: Point,
    edge_ba: Vector,
    edge_ca: Vector,
) -> Option<f64> {
    let pvec = direction.cross(edge_ca);
    let det = edge_ba.dot(pvec);
    if det > -PARALLEL_EPS && det < PARALLEL_EPS {
        return None;
    }
    let inv_det = 1. / det;

    let tvec = origin - vertex_a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0. ..=1.).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge_ba);
    let v = direction.dot(qvec) * inv_det;
    if v < 0. || u + v > 1. {
        return None;
    }

    Some(edge_ca.dot(qvec) * inv_det)
}
