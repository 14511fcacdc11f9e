pub mod point;
pub mod triangles;
pub mod vector;
pub mod visibility;

/// Geometric precision
const EPS: f64 = 1e-13;
