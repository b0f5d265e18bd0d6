//! SAH-based BVH builder.
//!
//! Builds the flat node array of [`Bvh`] from a cube list, choosing
//! splits with a binned Surface Area Heuristic.

use super::bvh::{Aabb, Bvh, BvhNode, Cube};
use crate::util::Vec3;

/// Number of SAH bins for split evaluation.
const NUM_BINS: usize = 12;

/// Cost ratio: traversal vs intersection.
const TRAVERSAL_COST: f32 = 1.0;
const INTERSECT_COST: f32 = 1.0;

/// Maximum cubes per leaf before forcing a split.
const MAX_LEAF_SIZE: usize = 4;

/// SAH bin for evaluating split candidates.
#[derive(Clone, Copy)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

impl Bin {
    const EMPTY: Self = Self { bounds: Aabb::EMPTY, count: 0 };
}

/// Build a BVH over `cubes`.
///
/// Cubes are not moved; `prim_indices` maps leaves into the original slice.
#[tracing::instrument(skip_all, fields(cube_count = cubes.len()))]
pub fn build_bvh(cubes: &[Cube]) -> Bvh {
    let n = cubes.len();
    if n == 0 {
        return Bvh { nodes: vec![BvhNode::EMPTY], prim_indices: vec![] };
    }

    let centroids: Vec<Vec3> = cubes.iter().map(Cube::centroid).collect();
    let aabbs: Vec<Aabb> = cubes.iter().map(Cube::aabb).collect();
    let mut indices: Vec<usize> = (0..n).collect();

    // worst case 2n - 1 nodes
    let mut nodes: Vec<BvhNode> = Vec::with_capacity(2 * n);
    nodes.push(BvhNode::EMPTY);

    struct Task {
        node_idx: usize,
        start: usize,
        end: usize, // exclusive
    }

    let mut stack = vec![Task { node_idx: 0, start: 0, end: n }];

    while let Some(task) = stack.pop() {
        let (start, end) = (task.start, task.end);
        let count = end - start;

        let mut node_aabb = Aabb::EMPTY;
        for &idx in &indices[start..end] {
            node_aabb.grow(&aabbs[idx]);
        }
        let leaf = BvhNode { bounds: node_aabb, left_or_first: start as u32, count: count as u32 };

        if count <= MAX_LEAF_SIZE {
            nodes[task.node_idx] = leaf;
            continue;
        }

        let mut centroid_bounds = Aabb::EMPTY;
        for &idx in &indices[start..end] {
            centroid_bounds.grow_point(centroids[idx]);
        }

        let split = find_best_split(&indices[start..end], &aabbs, &centroids, &centroid_bounds);
        let leaf_cost = count as f32 * INTERSECT_COST * node_aabb.area();

        let Some((axis, split_pos, cost)) = split else {
            nodes[task.node_idx] = leaf;
            continue;
        };
        if cost >= leaf_cost {
            nodes[task.node_idx] = leaf;
            continue;
        }

        let mid = partition(&mut indices[start..end], |&idx| centroids[idx][axis] < split_pos)
            + start;
        // degenerate partition: split in the middle
        let mid = if mid == start || mid == end { (start + end) / 2 } else { mid };

        let left_idx = nodes.len();
        nodes.push(BvhNode::EMPTY);
        nodes.push(BvhNode::EMPTY);
        nodes[task.node_idx] =
            BvhNode { bounds: node_aabb, left_or_first: left_idx as u32, count: 0 };

        stack.push(Task { node_idx: left_idx + 1, start: mid, end });
        stack.push(Task { node_idx: left_idx, start, end: mid });
    }

    Bvh { nodes, prim_indices: indices }
}

/// SAH binned split search across all 3 axes.
/// Returns (axis, split position, cost), `None` if every axis is degenerate.
fn find_best_split(
    indices: &[usize],
    aabbs: &[Aabb],
    centroids: &[Vec3],
    centroid_bounds: &Aabb,
) -> Option<(usize, f32, f32)> {
    let mut best: Option<(usize, f32, f32)> = None;

    for axis in 0..3 {
        let extent = centroid_bounds.max[axis] - centroid_bounds.min[axis];
        if extent < 1e-8 {
            continue;
        }

        let mut bins = [Bin::EMPTY; NUM_BINS];
        let inv_extent = NUM_BINS as f32 / extent;
        for &idx in indices {
            let bin_id = ((centroids[idx][axis] - centroid_bounds.min[axis]) * inv_extent) as usize;
            let bin = &mut bins[bin_id.min(NUM_BINS - 1)];
            bin.bounds.grow(&aabbs[idx]);
            bin.count += 1;
        }

        let mut left_area = [0.0f32; NUM_BINS - 1];
        let mut left_count = [0usize; NUM_BINS - 1];
        let mut sweep = Aabb::EMPTY;
        let mut sweep_count = 0;
        for i in 0..NUM_BINS - 1 {
            sweep.grow(&bins[i].bounds);
            sweep_count += bins[i].count;
            left_area[i] = sweep.area();
            left_count[i] = sweep_count;
        }

        sweep = Aabb::EMPTY;
        sweep_count = 0;
        for i in (1..NUM_BINS).rev() {
            sweep.grow(&bins[i].bounds);
            sweep_count += bins[i].count;
            let cost = TRAVERSAL_COST
                + INTERSECT_COST
                    * (left_count[i - 1] as f32 * left_area[i - 1]
                        + sweep_count as f32 * sweep.area());

            if best.map_or(true, |(_, _, c)| cost < c) {
                let pos = centroid_bounds.min[axis] + (i as f32 / NUM_BINS as f32) * extent;
                best = Some((axis, pos, cost));
            }
        }
    }

    best
}

/// Partition slice in place. Returns count of elements where predicate is true.
fn partition<T, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}
