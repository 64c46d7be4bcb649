//! Random scenes and brute-force references for tests and demos.

use rand::Rng;

use crate::{
    aabb::Aabb,
    ray::Ray,
    vector::{BvhVector, Real},
};

/// Uniformly distributed unit vector.
pub fn random_direction<V: BvhVector, R: Rng>(rng: &mut R) -> V {
    loop {
        let mut v = V::default();
        for i in 0..V::DIM {
            v.set_component(i, V::Scalar::from_f64(rng.random_range(-1.0..1.0)));
        }
        let length = v.length().to_f64();
        // Rejection sampling inside the unit ball keeps the distribution uniform.
        if length > 1e-3 && length <= 1.0 {
            return v.scaled(V::Scalar::from_f64(1.0 / length));
        }
    }
}

/// Point with every coordinate in `[-extent, extent)`.
pub fn random_point<V: BvhVector, R: Rng>(rng: &mut R, extent: f64) -> V {
    let mut v = V::default();
    for i in 0..V::DIM {
        v.set_component(i, V::Scalar::from_f64(rng.random_range(-extent..extent)));
    }
    v
}

/// `count` boxes with corners in `[-extent, extent)` and sides of at most `max_size`.
pub fn random_boxes<V: BvhVector, R: Rng>(
    rng: &mut R,
    count: usize,
    extent: f64,
    max_size: f64,
) -> Vec<Aabb<V>> {
    (0..count)
        .map(|_| {
            let min: V = random_point(rng, extent);
            let mut max = min;
            for i in 0..V::DIM {
                let size = rng.random_range(0.01 * max_size..=max_size);
                max.set_component(i, min.component(i) + V::Scalar::from_f64(size));
            }
            Aabb::new(min, max)
        })
        .collect()
}

/// Nearest box hit by scanning all of `boxes`, as `(distance, index)`.
pub fn brute_force_nearest<V: BvhVector>(
    boxes: &[Aabb<V>],
    ray: &Ray<V>,
    max_distance: V::Scalar,
) -> Option<(V::Scalar, u32)> {
    boxes
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.intersect(ray, max_distance).map(|t| (t, i as u32)))
        .fold(None, |best: Option<(V::Scalar, u32)>, hit| match best {
            Some(b) if b.0 <= hit.0 => Some(b),
            _ => Some(hit),
        })
}
