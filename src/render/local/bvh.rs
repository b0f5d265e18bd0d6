//! Bounding volume hierarchy over unit cubes.
//!
//! Flat node array, index 0 is the root:
//! - internal node: `left_or_first` = left child, right child follows it
//! - leaf node: `left_or_first` = first entry of `prim_indices`, `count > 0`

use crate::util::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Grow to include a point.
    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to include another box.
    #[inline]
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Surface area (for SAH cost).
    #[inline]
    pub fn area(&self) -> f32 {
        let d = self.max - self.min;
        if d.min_element() < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Ray entry/exit distances, `None` on a miss.
    #[inline]
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<f32> {
        let t0 = (self.min - ray.origin) * ray.inv_dir;
        let t1 = (self.max - ray.origin) * ray.inv_dir;
        let near = t0.min(t1).max_element().max(0.0);
        let far = t0.max(t1).min_element().min(t_max);
        (near <= far).then_some(near)
    }
}

/// Ray with cached reciprocal direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
    pub inv_dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir, inv_dir: dir.recip() }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Unit cube primitive in scene-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    /// Lower corner; the cube spans `min..min + 1`.
    pub min: Vec3,
    pub material: u16,
}

impl Cube {
    #[inline]
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min, self.min + Vec3::ONE)
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.min + Vec3::splat(0.5)
    }

    /// Entry distance and outward face normal.
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
        let max = self.min + Vec3::ONE;
        let t0 = (self.min - ray.origin) * ray.inv_dir;
        let t1 = (max - ray.origin) * ray.inv_dir;
        let tmin = t0.min(t1);
        let tmax = t0.max(t1);
        let near = tmin.max_element();
        let far = tmax.min_element();
        // rays starting inside a cube do not hit it
        if near > far || near <= 1e-4 || near >= t_max {
            return None;
        }
        let normal = if near == tmin.x {
            Vec3::new(-ray.dir.x.signum(), 0.0, 0.0)
        } else if near == tmin.y {
            Vec3::new(0.0, -ray.dir.y.signum(), 0.0)
        } else {
            Vec3::new(0.0, 0.0, -ray.dir.z.signum())
        };
        Some((near, normal))
    }
}

/// BVH node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub left_or_first: u32,
    pub count: u32,
}

impl BvhNode {
    pub const EMPTY: Self = Self { bounds: Aabb::EMPTY, left_or_first: 0, count: 0 };

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Closest intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub normal: Vec3,
    pub material: u16,
}

/// Built hierarchy over a cube list.
#[derive(Debug, Clone)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    /// Reordered cube indices (leaves reference into this).
    pub prim_indices: Vec<usize>,
}

impl Bvh {
    /// Closest hit along `ray` before `t_max`.
    pub fn intersect(&self, cubes: &[Cube], ray: &Ray, t_max: f32) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        let mut limit = t_max;
        self.walk(ray, t_max, |node| {
            for &idx in self.leaf_prims(node) {
                let cube = &cubes[idx];
                if let Some((t, normal)) = cube.intersect(ray, limit) {
                    limit = t;
                    best = Some(Hit { t, normal, material: cube.material });
                }
            }
            limit
        });
        best
    }

    /// Whether anything blocks `ray` before `t_max`.
    pub fn occluded(&self, cubes: &[Cube], ray: &Ray, t_max: f32) -> bool {
        let mut hit = false;
        self.walk(ray, t_max, |node| {
            hit = self.leaf_prims(node).iter().any(|&i| cubes[i].intersect(ray, t_max).is_some());
            if hit {
                0.0
            } else {
                t_max
            }
        });
        hit
    }

    fn leaf_prims(&self, node: &BvhNode) -> &[usize] {
        let first = node.left_or_first as usize;
        &self.prim_indices[first..first + node.count as usize]
    }

    /// Depth-first traversal; `leaf` returns the new distance limit,
    /// zero stops the walk.
    fn walk(&self, ray: &Ray, t_max: f32, mut leaf: impl FnMut(&BvhNode) -> f32) {
        if self.prim_indices.is_empty() {
            return;
        }
        let mut limit = t_max;
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.push(0);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if node.bounds.intersect(ray, limit).is_none() {
                continue;
            }
            if node.is_leaf() {
                limit = leaf(node);
                if limit <= 0.0 {
                    return;
                }
                continue;
            }
            let left = node.left_or_first;
            let right = left + 1;
            let dl = self.nodes[left as usize].bounds.intersect(ray, limit);
            let dr = self.nodes[right as usize].bounds.intersect(ray, limit);
            // push the farther child first so the nearer one is visited next
            match (dl, dr) {
                (Some(a), Some(b)) if a <= b => {
                    stack.push(right);
                    stack.push(left);
                }
                (Some(_), Some(_)) => {
                    stack.push(left);
                    stack.push(right);
                }
                (Some(_), None) => stack.push(left),
                (None, Some(_)) => stack.push(right),
                (None, None) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_hit_normal() {
        let cube = Cube { min: Vec3::ZERO, material: 3 };
        let ray = Ray::new(Vec3::new(0.5, 5.0, 0.5), Vec3::NEG_Y);
        let (t, n) = cube.intersect(&ray, f32::INFINITY).unwrap();
        assert!((t - 4.0).abs() < 1e-6);
        assert_eq!(n, Vec3::Y);

        let miss = Ray::new(Vec3::new(2.5, 5.0, 0.5), Vec3::NEG_Y);
        assert!(cube.intersect(&miss, f32::INFINITY).is_none());
        assert!(cube.intersect(&ray, 3.0).is_none());
    }

    #[test]
    fn test_aabb_area() {
        let b = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.area(), 22.0);
        assert_eq!(Aabb::EMPTY.area(), 0.0);
    }
}
