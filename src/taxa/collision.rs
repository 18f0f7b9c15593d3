//! Pairwise "same object?" test and the merge that follows a positive test.

use rand::Rng;
use tracing::trace;

use super::taxon::CameraTrackedTaxon;

/// Whether `a` and `b` are observations of the same object.
///
/// Only points whose offset from their own centre has a dot product in
/// `[0, 1]` with the unnormalized `a -> b` centre vector take part in the
/// open-edge search. The range is not divided by the squared centre
/// distance, so it behaves as a distance-bounded slab rather than a
/// fractional projection; merge tuning depends on that exact behaviour.
///
/// For each participating point of `a` the nearest participating point of
/// `b` is found and both edge flags are folded into the per-side
/// `joins_open_edge`. Each side then reaches `|extent| * ratio`, with the
/// open ratio for sides that join at a frame-truncated edge. The taxa
/// collide when their centres are closer than the sum of both reaches.
pub fn collides(a: &CameraTrackedTaxon, b: &CameraTrackedTaxon) -> bool {
    if a.name() != b.name() {
        return false;
    }

    let center_a = a.center();
    let center_b = b.center();
    let dir_a_to_b = center_b - center_a;

    let in_slab = |dot: f64| (0.0..=1.0).contains(&dot);

    let points_b: Vec<_> = b
        .sample_points()
        .into_iter()
        .filter(|(p, _)| in_slab(dir_a_to_b.dot(&(p - center_b))))
        .collect();

    let mut joins_open_edge_a = false;
    let mut joins_open_edge_b = false;

    for (point_a, edge_a) in a.sample_points() {
        if !in_slab(dir_a_to_b.dot(&(point_a - center_a))) {
            continue;
        }

        let nearest_b = points_b
            .iter()
            .map(|(p, edge)| ((point_a - p).norm_squared(), *edge))
            .min_by(|x, y| x.0.total_cmp(&y.0));

        if let Some((_, edge_b)) = nearest_b {
            joins_open_edge_a |= edge_a;
            joins_open_edge_b |= edge_b;
        }
    }

    let margin = |taxon: &CameraTrackedTaxon, open: bool| {
        let config = taxon.config();
        let ratio = if open {
            config.margin_ratio_open
        } else {
            config.margin_ratio_closed
        };
        taxon.extent().norm() * ratio
    };

    let allowed = margin(a, joins_open_edge_a) + margin(b, joins_open_edge_b);
    let distance = dir_a_to_b.norm();
    trace!(
        name = a.name(),
        distance,
        allowed,
        open_a = joins_open_edge_a,
        open_b = joins_open_edge_b,
        "collision test"
    );
    distance < allowed
}

/// Fold `absorbed` into `survivor`.
///
/// The survivor's samples become the union of both sets ordered by capture
/// time, re-admitted through the outlier filter and sample cap. The
/// survivor keeps its name and lifecycle counters; `absorbed` is consumed.
pub fn merge_into<R: Rng + ?Sized>(
    survivor: &mut CameraTrackedTaxon,
    mut absorbed: CameraTrackedTaxon,
    rng: &mut R,
) {
    let mut samples = survivor.take_samples();
    samples.append(&mut absorbed.take_samples());
    samples.sort_by_key(|s| s.timestamp());
    survivor.set_samples_with_rng(samples, rng);
}

/// Which of two colliding taxa survives a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survivor {
    First,
    Second,
}

/// The taxon with the longer history survives; ties keep the first.
pub fn choose_survivor(first: &CameraTrackedTaxon, second: &CameraTrackedTaxon) -> Survivor {
    match (first.oldest_timestamp(), second.oldest_timestamp()) {
        (Some(a), Some(b)) if a > b => Survivor::Second,
        (None, Some(_)) => Survivor::Second,
        _ => Survivor::First,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use image::RgbaImage;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::taxa::outliers::RansacParams;
    use crate::taxa::sample::TrackSample;
    use crate::taxa::taxon::TaxonConfig;

    fn config() -> TaxonConfig {
        TaxonConfig {
            ransac: RansacParams {
                max_iterations: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Five points on a 2 cm cross around `center`, all flagged `edge`.
    fn taxon(name: &str, center: Vector3<f64>, edge: bool, t: Instant) -> CameraTrackedTaxon {
        let d = 0.02;
        let points = vec![
            center,
            center + Vector3::new(-d, 0.0, 0.0),
            center + Vector3::new(d, 0.0, 0.0),
            center + Vector3::new(0.0, d, 0.0),
            center + Vector3::new(0.0, -d, 0.0),
        ];
        let sample = TrackSample::new(
            -Vector3::z(),
            Vector3::y(),
            points,
            vec![edge; 5],
            Arc::new(RgbaImage::new(2, 2)),
            Vector3::zeros(),
            t,
        );
        let mut rng = StdRng::seed_from_u64(0);
        CameraTrackedTaxon::with_samples(name, vec![sample], config(), &mut rng)
    }

    #[test]
    fn test_different_names_never_collide() {
        let t = Instant::now();
        let cup = taxon("cup", Vector3::new(0.0, 0.0, 1.0), true, t);
        let bowl = taxon("bowl", Vector3::new(0.0, 0.0, 1.0), true, t);
        assert!(!collides(&cup, &bowl));
        assert!(!collides(&bowl, &cup));
    }

    #[test]
    fn test_coincident_taxa_collide() {
        let t = Instant::now();
        let a = taxon("cup", Vector3::new(0.0, 0.0, 1.0), false, t);
        let b = taxon("cup", Vector3::new(0.005, 0.0, 1.0), false, t);
        assert!(collides(&a, &b));
    }

    #[test]
    fn test_far_apart_taxa_do_not_collide() {
        let t = Instant::now();
        let a = taxon("cup", Vector3::new(0.0, 0.0, 1.0), true, t);
        let b = taxon("cup", Vector3::new(5.0, 0.0, 1.0), true, t);
        assert!(!collides(&a, &b));
    }

    #[test]
    fn test_open_edge_widens_reach() {
        // Extent floors at 5 cm per axis -> |extent| = 0.0866.
        // Closed reach sum 0.0866, open reach sum 0.2598.
        let t = Instant::now();
        let gap = Vector3::new(0.12, 0.0, 1.0);

        let closed_a = taxon("cup", Vector3::new(0.0, 0.0, 1.0), false, t);
        let closed_b = taxon("cup", gap, false, t);
        assert!(!collides(&closed_a, &closed_b));

        let open_a = taxon("cup", Vector3::new(0.0, 0.0, 1.0), true, t);
        let open_b = taxon("cup", gap, true, t);
        assert!(collides(&open_a, &open_b));
    }

    #[test]
    fn test_slab_check_uses_unnormalized_dot() {
        // Quirk kept on purpose: the slab bound is on the raw dot product,
        // so a 2 cm offset along a 10 m centre line gives 0.2 and still
        // participates while the opposite offset (-0.2) does not.
        let t = Instant::now();
        let a = taxon("cup", Vector3::new(0.0, 0.0, 1.0), true, t);
        let b = taxon("cup", Vector3::new(10.0, 0.0, 1.0), true, t);
        let dir = b.center() - a.center();
        let participating = a
            .sample_points()
            .iter()
            .filter(|(p, _)| (0.0..=1.0).contains(&dir.dot(&(p - a.center()))))
            .count();
        // centre, +x and both +-y points
        assert_eq!(participating, 4);
        assert!(!collides(&a, &b));
    }

    #[test]
    fn test_merge_unions_samples_in_time_order() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        let mut newer = taxon("cup", Vector3::new(0.0, 0.0, 1.0), false, t1);
        let older = taxon("cup", Vector3::new(0.01, 0.0, 1.0), false, t0);
        let mut rng = StdRng::seed_from_u64(3);

        merge_into(&mut newer, older, &mut rng);
        assert_eq!(newer.sample_count(), 2);
        assert_eq!(newer.point_count(), 10);
        let stamps: Vec<_> = newer.samples().iter().map(|s| s.timestamp()).collect();
        assert_eq!(stamps, vec![t0, t1]);
    }

    #[test]
    fn test_older_history_survives() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        let old = taxon("cup", Vector3::zeros(), false, t0);
        let young = taxon("cup", Vector3::zeros(), false, t1);
        assert_eq!(choose_survivor(&old, &young), Survivor::First);
        assert_eq!(choose_survivor(&young, &old), Survivor::Second);
        assert_eq!(choose_survivor(&old, &old.clone()), Survivor::First);
    }
}
