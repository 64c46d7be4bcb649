use std::time::Instant;

use glam::*;
use rand::{rngs::StdRng, SeedableRng};
use sah_bvh::{
    test_util::{random_boxes, random_direction, random_point},
    Aabb, BuildArgs, Bvh, BvhConfig, PrettyDuration, Ray,
};

const BOX_COUNT: usize = 200_000;
const RAY_COUNT: usize = 1_000_000;

fn main() {
    env_logger::init();
    let args: BuildArgs = argh::from_env();
    let config = BvhConfig::from(&args);
    config.scheduler.init();

    // A scene of random boxes. The BVH builder is only concerned with bounding boxes and
    // costs, the intersection itself happens in the traversal callback.
    let mut rng = StdRng::seed_from_u64(0);
    let boxes: Vec<Aabb<Vec3A>> = random_boxes(&mut rng, BOX_COUNT, 100.0, 1.0);

    let start = Instant::now();
    let bvh = match Bvh::from_objects(&boxes, &config) {
        Ok(bvh) => bvh,
        Err(e) => {
            eprintln!("BVH build failed: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "{:>8} build with {:?} ({})",
        PrettyDuration(start.elapsed()),
        config.scheduler,
        bvh.stats()
    );

    let mut rays: Vec<(Ray<Vec3A>, Option<(f32, u32)>)> = (0..RAY_COUNT)
        .map(|_| {
            let origin = random_point(&mut rng, 120.0);
            (Ray::new(origin, random_direction(&mut rng)), None)
        })
        .collect();

    // Traverse the BVH, finding the closest hit.
    let start = Instant::now();
    config.scheduler.par_map(
        &mut rays,
        &|_, item: &mut (Ray<Vec3A>, Option<(f32, u32)>)| {
            let (ray, hit) = (&item.0, &mut item.1);
            if bvh.intersect_root(ray, f32::INFINITY).is_none() {
                return;
            }
            *hit = bvh.intersect(ray, f32::INFINITY, |indices, distance| {
                indices
                    .iter()
                    .filter_map(|&i| boxes[i as usize].intersect(ray, distance).map(|t| (t, i)))
                    .min_by(|a, b| a.0.total_cmp(&b.0))
            });
        },
        64,
    );
    let elapsed = start.elapsed();

    let hits = rays.iter().filter(|(_, hit)| hit.is_some()).count();
    println!(
        "{:>8} traverse {RAY_COUNT} rays, {hits} hits, {:.2} Mrays/s",
        PrettyDuration(elapsed),
        RAY_COUNT as f64 / elapsed.as_secs_f64() / 1e6
    );
}
