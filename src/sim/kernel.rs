//! View-factor kernel.
//!
//! For every emitter triangle (sequentially) the kernel evaluates one row of
//! pair contributions over all receiver triangles (data-parallel through a
//! [`ComputeBackend`]) and hands the row to the [`Accumulator`].
//!
//! Per pair `(e, r)`:
//!
//! ```text
//! ray    = center_r - center_e
//! cos1   = |n_e . ray| / (|n_e| |ray|)
//! cos2   = |n_r . ray| / (|n_r| |ray|)
//! dF     = cos1 cos2 A_e A_r / (pi |ray|^2)
//! ```
//!
//! A pair whose centroid segment is blocked by an interconnect triangle
//! contributes exactly 0.

use std::f64::consts::PI;

use crate::error::ComputeError;
use crate::geom::triangles::{TriangleBatch, magnitude};
use crate::geom::vector::Vector;

use super::accumulator::Accumulator;
use super::backend::ComputeBackend;
use super::cancel::CancelToken;

/// Progress of the emitter loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelProgress {
    /// Emitter rows dispatched and submitted (1..=num_emitters).
    pub emitters_done: usize,
    pub num_emitters: usize,
}

/// Radiative contribution of one unoccluded triangle pair.
///
/// Cosines are taken in absolute value, so a receiver facing away from the
/// emitter contributes as if it were facing it. Returns 0 for a zero-length
/// ray or a zero-length normal.
pub fn contribution(
    emitter_normal: Vector,
    emitter_area: f64,
    receiver_normal: Vector,
    receiver_area: f64,
    ray: Vector,
    ray_len: f64,
) -> f64 {
    let ne = emitter_normal.length();
    let nr = receiver_normal.length();
    if ray_len == 0.0 || ne == 0.0 || nr == 0.0 {
        return 0.0;
    }
    let cos1 = (emitter_normal.dot(ray) / (ne * ray_len)).abs();
    let cos2 = (receiver_normal.dot(ray) / (nr * ray_len)).abs();
    cos1 * cos2 * emitter_area * receiver_area / (PI * ray_len * ray_len)
}

/// Borrows the three batches for the duration of one computation.
pub struct ViewFactorKernel<'a> {
    emitter: &'a TriangleBatch,
    receiver: &'a TriangleBatch,
    interconnect: &'a TriangleBatch,
}

impl<'a> ViewFactorKernel<'a> {
    pub fn new(
        emitter: &'a TriangleBatch,
        receiver: &'a TriangleBatch,
        interconnect: &'a TriangleBatch,
    ) -> Self {
        Self {
            emitter,
            receiver,
            interconnect,
        }
    }

    /// True when the result is 0 without running any dispatch.
    pub fn is_degenerate(&self) -> bool {
        self.emitter.is_empty() || self.receiver.is_empty()
    }

    /// Occlusion-gated contribution of emitter `e` to receiver `r`.
    pub fn pair_contribution(&self, e: usize, r: usize) -> f64 {
        let origin = self.emitter.centers().point(e);
        let ray = Vector::from_points(origin, self.receiver.centers().point(r));
        let ray_len = magnitude(ray.dx, ray.dy, ray.dz);
        if ray_len == 0.0 {
            return 0.0;
        }

        if self.interconnect.occludes_segment(origin, ray) {
            return 0.0;
        }

        contribution(
            self.emitter.normals().vector(e),
            self.emitter.areas()[e],
            self.receiver.normals().vector(r),
            self.receiver.areas()[r],
            ray,
            ray_len,
        )
    }

    /// Fills `row[r]` with the contribution of emitter `e` to every receiver `r`.
    pub fn dispatch_row(
        &self,
        backend: &dyn ComputeBackend,
        e: usize,
        row: &mut [f64],
    ) -> Result<(), ComputeError> {
        backend.dispatch(row, &|r| self.pair_contribution(e, r))
    }

    /// Runs the emitter loop, submitting one row per emitter triangle.
    ///
    /// Rows are submitted in emitter order; `progress` is called after each
    /// submission. The cancel token is checked before every dispatch.
    pub fn run<F>(
        &self,
        backend: &dyn ComputeBackend,
        accumulator: &Accumulator,
        cancel: &CancelToken,
        mut progress: F,
    ) -> Result<(), ComputeError>
    where
        F: FnMut(&KernelProgress),
    {
        if self.is_degenerate() {
            log::debug!(
                "degenerate input ({} emitter, {} receiver triangles), skipping kernel",
                self.emitter.len(),
                self.receiver.len()
            );
            return Ok(());
        }

        let num_emitters = self.emitter.len();
        let num_receivers = self.receiver.len();
        for e in 0..num_emitters {
            if cancel.is_cancelled() {
                return Err(ComputeError::Cancelled {
                    completed: e,
                    total: num_emitters,
                });
            }
            let mut row = vec![0.0; num_receivers];
            self.dispatch_row(backend, e, &mut row)?;
            accumulator.submit(row)?;
            progress(&KernelProgress {
                emitters_done: e + 1,
                num_emitters,
            });
        }
        Ok(())
    }

    /// Raw sum over all pairs using a fresh accumulator.
    pub fn sum(
        &self,
        backend: &dyn ComputeBackend,
        accumulator_workers: usize,
    ) -> Result<f64, ComputeError> {
        let accumulator = Accumulator::new(accumulator_workers)?;
        self.run(backend, &accumulator, &CancelToken::new(), |_| {})?;
        accumulator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeometryError;
    use crate::geom::point::Point;
    use crate::geom::triangles::Facet;
    use crate::sim::backend::{RayonBackend, SerialBackend, WorkItem};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn facet(a: [f64; 3], b: [f64; 3], c: [f64; 3], n: [f64; 3]) -> Facet {
        Facet::new(
            Vector::new(n[0], n[1], n[2]),
            Point::new(a[0], a[1], a[2]),
            Point::new(b[0], b[1], b[2]),
            Point::new(c[0], c[1], c[2]),
        )
    }

    /// Unit right triangle in the plane z = `z`.
    fn unit_triangle(z: f64, nz: f64) -> Facet {
        facet([0., 0., z], [1., 0., z], [0., 1., z], [0., 0., nz])
    }

    /// Large triangle in the plane z = `z` covering the unit triangle centroid.
    fn blocker(z: f64) -> Facet {
        facet([-5., -5., z], [5., -5., z], [0., 5., z], [0., 0., 1.])
    }

    fn batch(facets: &[Facet]) -> Result<TriangleBatch, GeometryError> {
        TriangleBatch::from_facets(facets)
    }

    struct CountingBackend(AtomicUsize);

    impl ComputeBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn dispatch(&self, out: &mut [f64], work: &WorkItem<'_>) -> Result<(), ComputeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            SerialBackend.dispatch(out, work)
        }
    }

    #[test]
    fn test_facing_unit_triangles_golden_value() -> anyhow::Result<()> {
        let d = 2.0;
        let e = batch(&[unit_triangle(0., 1.)])?;
        let r = batch(&[unit_triangle(d, -1.)])?;
        let i = TriangleBatch::empty();

        // Both cosines are 1, both areas 0.5.
        let expected = 0.5 * 0.5 / (PI * d * d);
        let vf = ViewFactorKernel::new(&e, &r, &i).sum(&SerialBackend, 2)?;
        assert!(
            (vf - expected).abs() < 1e-15,
            "vf = {vf}, expected = {expected}"
        );
        assert!((vf - 0.019894367886486918).abs() < 1e-15);
        Ok(())
    }

    #[test]
    fn test_blocker_between_centroids_zeroes_pair() -> anyhow::Result<()> {
        let e = batch(&[unit_triangle(0., 1.)])?;
        let r = batch(&[unit_triangle(2., -1.)])?;
        let empty = TriangleBatch::empty();
        assert!(ViewFactorKernel::new(&e, &r, &empty).pair_contribution(0, 0) > 0.);

        let between = batch(&[blocker(1.)])?;
        let kernel = ViewFactorKernel::new(&e, &r, &between);
        assert_eq!(kernel.pair_contribution(0, 0), 0.);
        assert_eq!(kernel.sum(&SerialBackend, 1)?, 0.);
        Ok(())
    }

    #[test]
    fn test_blocker_outside_segment_does_not_occlude() -> anyhow::Result<()> {
        let e = batch(&[unit_triangle(0., 1.)])?;
        let r = batch(&[unit_triangle(2., -1.)])?;
        let free = ViewFactorKernel::new(&e, &r, &TriangleBatch::empty()).pair_contribution(0, 0);

        let beyond = batch(&[blocker(3.)])?;
        let behind = batch(&[blocker(-1.)])?;
        assert_eq!(
            ViewFactorKernel::new(&e, &r, &beyond).pair_contribution(0, 0),
            free
        );
        assert_eq!(
            ViewFactorKernel::new(&e, &r, &behind).pair_contribution(0, 0),
            free
        );
        Ok(())
    }

    #[test]
    fn test_tiny_occluder_blocks_long_segment() -> anyhow::Result<()> {
        let e = batch(&[unit_triangle(0., 1.)])?;
        let r = batch(&[unit_triangle(10., -1.)])?;
        let free = ViewFactorKernel::new(&e, &r, &TriangleBatch::empty()).pair_contribution(0, 0);
        assert!(free > 0.);

        // Legs of 6e-5 centered on the centroid line at mid-height: twice its
        // area is below the parallel band, the area times the ray length is not.
        let c = 1. / 3.;
        let h = 2e-5;
        let tiny = batch(&[facet(
            [c - h, c - h, 5.],
            [c + 2. * h, c - h, 5.],
            [c - h, c + 2. * h, 5.],
            [0., 0., 1.],
        )])?;
        assert_eq!(
            ViewFactorKernel::new(&e, &r, &tiny).pair_contribution(0, 0),
            0.
        );
        Ok(())
    }

    #[test]
    fn test_contribution_invariant_under_axis_permutation() {
        let ne = Vector::new(0.2, -0.7, 0.6);
        let nr = Vector::new(-0.1, 0.3, -0.9);
        let ray = Vector::new(1.3, 0.4, 2.2);
        let len = ray.length();
        let base = contribution(ne, 0.8, nr, 1.7, ray, len);
        assert!(base > 0.);

        for perm in [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
            let p = contribution(
                ne.permute(perm),
                0.8,
                nr.permute(perm),
                1.7,
                ray.permute(perm),
                len,
            );
            assert!(
                ((p - base) / base).abs() < 1e-12,
                "perm {perm:?}: {p} != {base}"
            );
        }
    }

    #[test]
    fn test_kernel_invariant_under_axis_permutation() -> anyhow::Result<()> {
        let emitter = vec![
            facet([0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [0., 0., 1.]),
            facet([1., 0., 0.], [1., 1., 0.], [0., 1., 0.], [0., 0., 1.]),
        ];
        let receiver = vec![
            facet([0., 0., 3.], [0., 2., 3.], [2., 0., 3.], [0., 0., -1.]),
            facet([0.5, 0.5, 2.], [1.5, 0.5, 2.5], [0.5, 1.5, 2.5], [0., 0.7, -0.7]),
        ];
        let vf = |perm: [usize; 3]| -> anyhow::Result<f64> {
            let permute = |fs: &[Facet]| -> Vec<Facet> {
                fs.iter()
                    .map(|f| Facet {
                        normal: f.normal.permute(perm),
                        vertices: f.vertices.map(|v| v.permute(perm)),
                    })
                    .collect()
            };
            let e = batch(&permute(&emitter))?;
            let r = batch(&permute(&receiver))?;
            let i = TriangleBatch::empty();
            Ok(ViewFactorKernel::new(&e, &r, &i).sum(&SerialBackend, 2)?)
        };

        let base = vf([0, 1, 2])?;
        for perm in [[2, 0, 1], [1, 2, 0], [0, 2, 1]] {
            let p = vf(perm)?;
            assert!(((p - base) / base).abs() < 1e-12, "perm {perm:?}: {p} != {base}");
        }
        Ok(())
    }

    #[test]
    fn test_back_facing_pair_contributes_positively() -> anyhow::Result<()> {
        // Receiver normal points away from the emitter; |cos| keeps it positive.
        let e = batch(&[unit_triangle(0., 1.)])?;
        let facing = batch(&[unit_triangle(2., -1.)])?;
        let away = batch(&[unit_triangle(2., 1.)])?;
        let i = TriangleBatch::empty();
        let a = ViewFactorKernel::new(&e, &facing, &i).pair_contribution(0, 0);
        let b = ViewFactorKernel::new(&e, &away, &i).pair_contribution(0, 0);
        assert!(b > 0.);
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_degenerate_contributions_are_zero() {
        let n = Vector::new(0., 0., 1.);
        assert_eq!(contribution(n, 1., n, 1., Vector::new(0., 0., 0.), 0.), 0.);
        let zero = Vector::new(0., 0., 0.);
        assert_eq!(contribution(zero, 1., n, 1., n, 1.), 0.);
    }

    #[test]
    fn test_empty_batches_skip_dispatch() -> anyhow::Result<()> {
        let some = batch(&[unit_triangle(0., 1.), unit_triangle(1., -1.)])?;
        let empty = TriangleBatch::empty();
        let backend = CountingBackend(AtomicUsize::new(0));

        assert_eq!(ViewFactorKernel::new(&empty, &some, &empty).sum(&backend, 2)?, 0.);
        assert_eq!(ViewFactorKernel::new(&some, &empty, &empty).sum(&backend, 2)?, 0.);
        assert_eq!(backend.0.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_one_dispatch_and_progress_per_emitter() -> anyhow::Result<()> {
        let e = batch(&[unit_triangle(0., 1.), unit_triangle(0.5, 1.), unit_triangle(1., 1.)])?;
        let r = batch(&[unit_triangle(3., -1.), unit_triangle(4., -1.)])?;
        let i = TriangleBatch::empty();
        let backend = CountingBackend(AtomicUsize::new(0));
        let accumulator = Accumulator::new(2)?;

        let mut seen = vec![];
        ViewFactorKernel::new(&e, &r, &i).run(
            &backend,
            &accumulator,
            &CancelToken::new(),
            |p| seen.push((p.emitters_done, p.num_emitters)),
        )?;
        accumulator.finish()?;
        assert_eq!(backend.0.load(Ordering::SeqCst), 3);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
        Ok(())
    }

    #[test]
    fn test_rayon_matches_serial() -> anyhow::Result<()> {
        let emitter: Vec<Facet> = (0..6)
            .map(|k| unit_triangle(0.1 * k as f64, 1.))
            .collect();
        let receiver: Vec<Facet> = (0..40)
            .map(|k| {
                let x = (k % 8) as f64;
                let y = (k / 8) as f64;
                facet([x, y, 5.], [x + 1., y, 5.], [x, y + 1., 5.], [0., 0., -1.])
            })
            .collect();
        let e = batch(&emitter)?;
        let r = batch(&receiver)?;
        let i = batch(&[blocker(2.)])?;
        let kernel = ViewFactorKernel::new(&e, &r, &i);

        let mut pooled = RayonBackend::new(4);
        pooled.prepare()?;
        let serial = kernel.sum(&SerialBackend, 1)?;
        let parallel = kernel.sum(&pooled, 4)?;
        assert!(serial > 0.);
        assert!(((parallel - serial) / serial).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_cancel_stops_between_emitters() -> anyhow::Result<()> {
        let e = batch(&[unit_triangle(0., 1.), unit_triangle(0.5, 1.)])?;
        let r = batch(&[unit_triangle(3., -1.)])?;
        let i = TriangleBatch::empty();
        let accumulator = Accumulator::new(1)?;
        let cancel = CancelToken::new();

        let result = ViewFactorKernel::new(&e, &r, &i).run(
            &SerialBackend,
            &accumulator,
            &cancel,
            |_| cancel.cancel(),
        );
        assert!(matches!(
            result,
            Err(ComputeError::Cancelled {
                completed: 1,
                total: 2
            })
        ));
        Ok(())
    }
}
