//! CPU path tracing kernel.

use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::build::build_bvh;
use super::bvh::{Bvh, Cube, Ray};
use super::passes::RenderPass;
use crate::camera::ProjectionMode;
use crate::render::TexturePalette;
use crate::scene::SceneDescription;
use crate::util::{IVec3, Vec3};

/// Offset of secondary ray origins from the surface.
const SURFACE_EPSILON: f32 = 1e-3;

/// Camera in scene-local coordinates.
#[derive(Debug, Clone, Copy)]
struct CameraRig {
    origin: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    projection: ProjectionMode,
    /// Orthographic: visible height in blocks. Pinhole: tan(fov / 2).
    extent: f32,
    aspect: f32,
}

/// Scene converted for tracing.
///
/// Blocks are translated by an integer origin near the camera so f32
/// coordinates stay exact far from the world origin.
#[derive(Debug, Clone)]
pub struct PreparedScene {
    width: usize,
    height: usize,
    cubes: Vec<Cube>,
    bvh: Bvh,
    albedo: Vec<Vec3>,
    emission: Vec<Vec3>,
    camera: CameraRig,
    sky: Vec3,
    sun_dir: Vec3,
    /// Zero when the sun is disabled.
    sun: Vec3,
    ray_depth: u32,
    transparent_sky: bool,
}

impl PreparedScene {
    /// Clip geometry, resolve material colours and build the BVH.
    pub fn new(scene: &SceneDescription, palette: &TexturePalette) -> Self {
        let settings = &scene.settings;
        let pose = &scene.camera;
        let origin = IVec3::new(
            pose.position.x.floor() as i32,
            pose.position.y.floor() as i32,
            pose.position.z.floor() as i32,
        );

        let geometry = scene.geometry.clip_y(scene.y_clip_min, scene.y_clip_max);
        let cubes: Vec<Cube> = geometry
            .blocks()
            .iter()
            .map(|b| Cube {
                min: (IVec3::new(b.x, b.y, b.z) - origin).as_vec3(),
                material: b.material,
            })
            .collect();

        let emitter_scale =
            if settings.emitters_enabled { settings.emitter_intensity as f32 } else { 0.0 };
        let (albedo, emission): (Vec<Vec3>, Vec<Vec3>) = geometry
            .materials()
            .iter()
            .map(|m| {
                let color = Vec3::from(palette.get(&m.name).unwrap_or(m.color));
                (color, color * m.emittance * emitter_scale)
            })
            .unzip();

        let bvh = build_bvh(&cubes);

        let local_pos = (pose.position - origin.as_dvec3()).as_vec3();
        let forward = pose.forward().as_vec3();
        let (right, up) = pose.image_axes();
        let aspect = scene.width as f32 / scene.height.max(1) as f32;
        let camera = match pose.projection {
            ProjectionMode::Orthographic => {
                // back off along the view ray so nothing above the image plane is cut
                let top = cubes.iter().map(|c| c.min.y + 1.0).fold(local_pos.y, f32::max);
                let back = if forward.y < -1e-6 {
                    (top + 1.0 - local_pos.y) / -forward.y
                } else {
                    bvh.nodes[0].bounds.area().sqrt() + 1.0
                };
                CameraRig {
                    origin: local_pos - forward * back.max(0.0),
                    forward,
                    right: right.as_vec3(),
                    up: up.as_vec3(),
                    projection: pose.projection,
                    extent: pose.fov as f32,
                    aspect,
                }
            }
            ProjectionMode::Pinhole => CameraRig {
                origin: local_pos,
                forward,
                right: right.as_vec3(),
                up: up.as_vec3(),
                projection: pose.projection,
                extent: (pose.fov.to_radians() as f32 * 0.5).tan(),
                aspect,
            },
        };

        let sun_dir = Vec3::from(settings.sun.direction().map(|v| v as f32));
        let sun = if settings.sun.enabled {
            Vec3::from(settings.sun.color.map(|v| v as f32)) * settings.sun.intensity as f32
        } else {
            Vec3::ZERO
        };

        debug!(cubes = cubes.len(), nodes = bvh.nodes.len(), "prepared scene");
        Self {
            width: scene.width as usize,
            height: scene.height as usize,
            cubes,
            bvh,
            albedo,
            emission,
            camera,
            sky: Vec3::from(settings.sky_color.map(|v| v as f32)) * settings.sky_intensity as f32,
            sun_dir,
            sun,
            ray_depth: settings.ray_depth,
            transparent_sky: scene.transparent_sky,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cubes after clipping.
    pub fn cube_count(&self) -> usize {
        self.cubes.len()
    }

    /// Primary ray through image position (`px`, `py`), pixels from the
    /// top-left corner.
    pub fn camera_ray(&self, px: f32, py: f32) -> Ray {
        let cam = &self.camera;
        let u = px / self.width as f32 - 0.5;
        let v = 0.5 - py / self.height as f32;
        match cam.projection {
            ProjectionMode::Orthographic => {
                let offset = cam.right * (u * cam.extent * cam.aspect) + cam.up * (v * cam.extent);
                Ray::new(cam.origin + offset, cam.forward)
            }
            ProjectionMode::Pinhole => {
                let dir = cam.forward
                    + cam.right * (2.0 * u * cam.extent * cam.aspect)
                    + cam.up * (2.0 * v * cam.extent);
                Ray::new(cam.origin, dir.normalize())
            }
        }
    }

    fn material_albedo(&self, id: u16) -> Vec3 {
        self.albedo.get(id as usize).copied().unwrap_or(Vec3::splat(0.5))
    }

    fn material_emission(&self, id: u16) -> Vec3 {
        self.emission.get(id as usize).copied().unwrap_or(Vec3::ZERO)
    }
}

/// Produces one RGBA sample for a pixel.
pub trait TraceKernel: Send + Sync {
    fn sample(
        &self,
        scene: &PreparedScene,
        pass: RenderPass,
        x: usize,
        y: usize,
        rng: &mut ChaCha8Rng,
    ) -> [f32; 4];
}

/// Unidirectional path tracer with sun next-event estimation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathTraceKernel;

impl TraceKernel for PathTraceKernel {
    fn sample(
        &self,
        scene: &PreparedScene,
        pass: RenderPass,
        x: usize,
        y: usize,
        rng: &mut ChaCha8Rng,
    ) -> [f32; 4] {
        let jx: f32 = rng.random();
        let jy: f32 = rng.random();
        let ray = scene.camera_ray(x as f32 + jx, y as f32 + jy);
        match pass {
            RenderPass::Normal => match scene.bvh.intersect(&scene.cubes, &ray, f32::INFINITY) {
                Some(hit) => [hit.normal.x, hit.normal.y, hit.normal.z, 1.0],
                None => [0.0, 0.0, 0.0, sky_alpha(scene)],
            },
            RenderPass::Albedo => match scene.bvh.intersect(&scene.cubes, &ray, f32::INFINITY) {
                Some(hit) => rgba(scene.material_albedo(hit.material), 1.0),
                None if scene.transparent_sky => [0.0; 4],
                None => rgba(scene.sky, 1.0),
            },
            RenderPass::Beauty => trace_path(scene, ray, rng),
        }
    }
}

#[inline]
fn rgba(c: Vec3, a: f32) -> [f32; 4] {
    [c.x, c.y, c.z, a]
}

#[inline]
fn sky_alpha(scene: &PreparedScene) -> f32 {
    if scene.transparent_sky {
        0.0
    } else {
        1.0
    }
}

fn trace_path(scene: &PreparedScene, mut ray: Ray, rng: &mut ChaCha8Rng) -> [f32; 4] {
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;

    for depth in 0..=scene.ray_depth {
        let Some(hit) = scene.bvh.intersect(&scene.cubes, &ray, f32::INFINITY) else {
            if depth == 0 && scene.transparent_sky {
                return [0.0; 4];
            }
            radiance += throughput * scene.sky;
            break;
        };

        let albedo = scene.material_albedo(hit.material);
        radiance += throughput * scene.material_emission(hit.material);
        let point = ray.at(hit.t) + hit.normal * SURFACE_EPSILON;

        let cos_sun = hit.normal.dot(scene.sun_dir);
        if cos_sun > 0.0 && scene.sun != Vec3::ZERO {
            let shadow = Ray::new(point, scene.sun_dir);
            if !scene.bvh.occluded(&scene.cubes, &shadow, f32::INFINITY) {
                radiance += throughput * albedo * scene.sun * cos_sun;
            }
        }

        if depth == scene.ray_depth {
            break;
        }
        throughput *= albedo;
        if throughput.max_element() < 1e-4 {
            break;
        }
        ray = Ray::new(point, cosine_hemisphere(hit.normal, rng));
    }

    rgba(radiance, 1.0)
}

/// Cosine-weighted direction around `n`.
fn cosine_hemisphere(n: Vec3, rng: &mut ChaCha8Rng) -> Vec3 {
    let r1: f32 = rng.random();
    let r2: f32 = rng.random();
    let phi = 2.0 * PI * r1;
    let r = r2.sqrt();
    let (t, b) = n.any_orthonormal_pair();
    (t * (r * phi.cos()) + b * (r * phi.sin()) + n * (1.0 - r2).max(0.0).sqrt()).normalize()
}

/// Deterministic per-pixel generator.
pub fn pixel_rng(seed: u64, pass: RenderPass, frame: u32, x: usize, y: usize) -> ChaCha8Rng {
    let mut h = seed ^ 0x9e37_79b9_7f4a_7c15;
    for v in [pass.id(), u64::from(frame), x as u64, y as u64] {
        h = splitmix64(h ^ v);
    }
    ChaCha8Rng::seed_from_u64(h)
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
