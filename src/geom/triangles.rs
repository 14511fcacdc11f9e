//! Structure-of-arrays triangle storage.
//!
//! Every geometric attribute lives in its own contiguous column so that a
//! kernel can sweep one attribute across all triangles. Emitter and receiver
//! batches use normals, centers and areas; interconnect (occluder) batches
//! additionally use the reference vertex and both edge vectors.

use crate::error::GeometryError;
use crate::geom::visibility::intersect_triangle;
use crate::{Point, Vector};

/// One raw triangle as produced by a mesh loader, in file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Facet {
    pub normal: Vector,
    pub vertices: [Point; 3],
}

impl Facet {
    pub fn new(normal: Vector, a: Point, b: Point, c: Point) -> Self {
        Self {
            normal,
            vertices: [a, b, c],
        }
    }

    /// Facet whose normal is computed from the vertex winding (zero if degenerate).
    pub fn from_vertices(a: Point, b: Point, c: Point) -> Self {
        let normal = Vector::normal(a, b, c).unwrap_or(Vector::new(0., 0., 0.));
        Self::new(normal, a, b, c)
    }
}

/// Three parallel coordinate columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coords {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl Coords {
    fn with_capacity(n: usize) -> Self {
        Self {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn point(&self, i: usize) -> Point {
        Point::new(self.x[i], self.y[i], self.z[i])
    }

    pub fn vector(&self, i: usize) -> Vector {
        Vector::new(self.x[i], self.y[i], self.z[i])
    }
}

/// Immutable triangulated mesh in structure-of-arrays layout.
///
/// All columns have identical length. An empty batch is valid everywhere a
/// batch is expected; as an occluder set it never occludes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleBatch {
    normal: Coords,
    vertex_a: Coords,
    edge_ba: Coords,
    edge_ca: Coords,
    center: Coords,
    area: Vec<f64>,
}

impl TriangleBatch {
    /// Batch with no triangles ("no interconnect mesh supplied").
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a batch from facets. Fails without exposing partial state if
    /// any facet carries a non-finite coordinate.
    pub fn from_facets(facets: &[Facet]) -> Result<Self, GeometryError> {
        let n = facets.len();
        let mut normal = Coords::with_capacity(n);
        let mut vertex_a = Coords::with_capacity(n);
        let mut edge_ba = Coords::with_capacity(n);
        let mut edge_ca = Coords::with_capacity(n);
        let mut center = Coords::with_capacity(n);
        let mut area = Vec::with_capacity(n);

        for (index, facet) in facets.iter().enumerate() {
            validate_facet(index, facet)?;
            let [a, b, c] = facet.vertices;
            let e1 = b - a;
            let e2 = c - a;
            let ctr = centroid(a, b, c);

            normal.push(facet.normal.dx, facet.normal.dy, facet.normal.dz);
            vertex_a.push(a.x, a.y, a.z);
            edge_ba.push(e1.dx, e1.dy, e1.dz);
            edge_ca.push(e2.dx, e2.dy, e2.dz);
            center.push(ctr.x, ctr.y, ctr.z);
            area.push(area_from_edges(e1, e2));
        }

        Ok(Self {
            normal,
            vertex_a,
            edge_ba,
            edge_ca,
            center,
            area,
        })
    }

    pub fn len(&self) -> usize {
        self.area.len()
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    pub fn normals(&self) -> &Coords {
        &self.normal
    }

    pub fn vertices_a(&self) -> &Coords {
        &self.vertex_a
    }

    pub fn edges_ba(&self) -> &Coords {
        &self.edge_ba
    }

    pub fn edges_ca(&self) -> &Coords {
        &self.edge_ca
    }

    pub fn centers(&self) -> &Coords {
        &self.center
    }

    pub fn areas(&self) -> &[f64] {
        &self.area
    }

    pub fn total_area(&self) -> f64 {
        self.area.iter().sum()
    }

    /// Returns true if any triangle of this batch blocks the segment
    /// `origin + t * ray`, `0 < t <= 1`. Hits behind the origin, at the
    /// origin itself or beyond `origin + ray` do not block.
    pub fn occludes_segment(&self, origin: Point, ray: Vector) -> bool {
        (0..self.len()).any(|i| {
            matches!(
                intersect_triangle(
                    origin,
                    ray,
                    self.vertex_a.point(i),
                    self.edge_ba.vector(i),
                    self.edge_ca.vector(i),
                ),
                Some(t) if t > 0.0 && t <= 1.0
            )
        })
    }
}

fn validate_facet(index: usize, facet: &Facet) -> Result<(), GeometryError> {
    if !facet.normal.is_finite() {
        return Err(GeometryError::Malformed {
            index,
            reason: "non-finite normal".to_string(),
        });
    }
    if let Some(k) = facet.vertices.iter().position(|v| !v.is_finite()) {
        return Err(GeometryError::Malformed {
            index,
            reason: format!("non-finite vertex {k}"),
        });
    }
    Ok(())
}

/// Arithmetic mean of the three vertices.
pub fn centroid(a: Point, b: Point, c: Point) -> Point {
    Point::new(
        (a.x + b.x + c.x) / 3.,
        (a.y + b.y + c.y) / 3.,
        (a.z + b.z + c.z) / 3.,
    )
}

/// Triangle area, half the magnitude of the edge cross product.
pub fn triangle_area(a: Point, b: Point, c: Point) -> f64 {
    area_from_edges(b - a, c - a)
}

fn area_from_edges(e1: Vector, e2: Vector) -> f64 {
    let cx = e1.dy * e2.dz - e1.dz * e2.dy;
    let cy = e1.dz * e2.dx - e1.dx * e2.dz;
    let cz = e1.dx * e2.dy - e1.dy * e2.dx;
    0.5 * (cx * cx + cy * cy + cz * cz).sqrt()
}

/// Euclidean length of `(x, y, z)`.
pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}
