//! Local progressive path tracing.
//!
//! Each render runs its passes (see [`passes`]) to their sample targets on
//! the backend's worker pool and blocks the caller until done. With
//! denoising enabled the beauty pass is tone-mapped, clamped to [0, 1] and
//! filtered using the albedo (and normal) side buffers.

pub mod build;
pub mod bvh;
pub mod framebuffer;
pub mod kernel;
pub mod passes;
pub mod pool;
pub mod postprocess;

pub use framebuffer::SampleBuffer;
pub use kernel::{PathTraceKernel, PreparedScene, TraceKernel};
pub use passes::{PassPlan, PassState, RenderPass};
pub use pool::{DutyCycle, WorkerPool};
pub use postprocess::PostProcessor;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PendingRender, RenderBackend, RenderedImage, SceneInit, TextureResources, TextureSet};
use crate::denoise::{clamp_unit, Denoiser, GuidedBilateralDenoiser};
use crate::scene::SceneDescription;
use crate::util::{Error, Result};

/// Denoiser passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseOptions {
    pub enabled: bool,
    pub albedo_samples_per_pixel: u32,
    pub normal_samples_per_pixel: u32,
}

impl Default for DenoiseOptions {
    fn default() -> Self {
        Self { enabled: false, albedo_samples_per_pixel: 16, normal_samples_per_pixel: 16 }
    }
}

/// Local backend settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalOptions {
    pub threads: usize,
    /// Percent of wall time the workers may be busy, 1..=100.
    pub cpu_load: u8,
    pub denoise: DenoiseOptions,
    /// Base of the per-pixel sample seeds.
    pub seed: u64,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self { threads: 2, cpu_load: 100, denoise: DenoiseOptions::default(), seed: 0 }
    }
}

/// Renders on this machine.
pub struct LocalPathTracer {
    options: LocalOptions,
    pool: WorkerPool,
    duty: DutyCycle,
    kernel: Arc<dyn TraceKernel>,
    denoiser: Arc<dyn Denoiser>,
    textures: Arc<TextureResources>,
    /// Bumped by [`interrupt`](Self::interrupt); renders started under an
    /// older generation fail.
    generation: AtomicU64,
}

impl LocalPathTracer {
    pub fn new(options: LocalOptions) -> Result<Self> {
        Self::with_parts(
            options,
            Arc::new(PathTraceKernel),
            Arc::new(GuidedBilateralDenoiser::default()),
            Arc::new(TextureResources::default()),
        )
    }

    pub fn with_parts(
        options: LocalOptions,
        kernel: Arc<dyn TraceKernel>,
        denoiser: Arc<dyn Denoiser>,
        textures: Arc<TextureResources>,
    ) -> Result<Self> {
        Ok(Self {
            pool: WorkerPool::new(options.threads)?,
            duty: DutyCycle::new(options.cpu_load),
            options,
            kernel,
            denoiser,
            textures,
            generation: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &LocalOptions {
        &self.options
    }

    pub fn textures(&self) -> &Arc<TextureResources> {
        &self.textures
    }

    /// Fail every render currently in progress with [`Error::Interrupted`].
    pub fn interrupt(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("local renders interrupted");
    }

    fn check_interrupted(&self, generation: u64) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(Error::Interrupted)
        }
    }

    /// Run the full pass sequence and produce the final image.
    #[tracing::instrument(skip_all, fields(backend = "local"))]
    pub fn render_blocking(
        &self,
        initialize_scene: SceneInit<'_>,
        textures: &TextureSet,
    ) -> Result<RenderedImage> {
        let generation = self.generation.load(Ordering::SeqCst);
        let palette = self.textures.palette(textures)?;

        let mut scene = SceneDescription::new();
        initialize_scene(&mut scene)?;
        scene.validate()?;

        let started = Instant::now();
        let prepared = PreparedScene::new(&scene, &palette);
        let denoise = self.options.denoise;
        let plan = PassPlan::new(
            denoise.enabled,
            denoise.normal_samples_per_pixel,
            denoise.albedo_samples_per_pixel,
            scene.target_spp,
        );

        let mut normal: Option<Vec<f32>> = None;
        let mut albedo: Option<Vec<f32>> = None;
        let mut beauty: Option<SampleBuffer> = None;

        let mut state = plan.next(PassState::Init);
        while let PassState::Running(pass) = state {
            let buffer = self.run_pass(&prepared, pass, plan.target(pass), generation)?;
            match pass {
                RenderPass::Normal => normal = Some(buffer.radiance()),
                RenderPass::Albedo => {
                    let mut a = buffer.radiance();
                    clamp_unit(&mut a);
                    albedo = Some(a);
                }
                RenderPass::Beauty => beauty = Some(buffer),
            }
            state = plan.next(state);
        }
        let beauty = beauty.ok_or_else(|| Error::scene("beauty pass did not run"))?;
        self.check_interrupted(generation)?;

        let post = PostProcessor::from_settings(&scene.settings);
        let image = if denoise.enabled {
            let (w, h) = (beauty.width(), beauty.height());
            let mut rgb = beauty.radiance();
            post.apply_buffer(&mut rgb);
            clamp_unit(&mut rgb);
            // normals only help together with albedo
            let normal = albedo.as_ref().and(normal.as_deref());
            let filtered = self.pool.install(|| {
                self.denoiser.denoise(w, h, &rgb, albedo.as_deref(), normal)
            })?;
            framebuffer::to_rgba8(w, h, &filtered, &beauty.alpha())
        } else {
            beauty.finalize(&post)
        };

        info!(
            name = %scene.name,
            width = scene.width,
            height = scene.height,
            spp = beauty.spp(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "local render finished"
        );
        Ok(RenderedImage::new(image))
    }

    /// Accumulate `spp` frames of one pass.
    fn run_pass(
        &self,
        scene: &PreparedScene,
        pass: RenderPass,
        spp: u32,
        generation: u64,
    ) -> Result<SampleBuffer> {
        debug!(%pass, spp, "starting pass");
        let mut buffer = SampleBuffer::new(scene.width(), scene.height());
        let sampler = &*self.kernel;
        let seed = self.options.seed;
        for frame in 0..spp {
            self.check_interrupted(generation)?;
            let busy = Instant::now();
            self.pool.install(|| {
                buffer.add_frame(|x, y| {
                    let mut rng = kernel::pixel_rng(seed, pass, frame, x, y);
                    sampler.sample(scene, pass, x, y, &mut rng)
                })
            });
            self.duty.pause(busy.elapsed());
        }
        Ok(buffer)
    }
}

impl RenderBackend for LocalPathTracer {
    fn render(&self, initialize_scene: SceneInit<'_>, textures: &TextureSet) -> PendingRender {
        PendingRender::ready(self.render_blocking(initialize_scene, textures))
    }

    fn set_default_texturepack(&self, path: Option<PathBuf>) {
        self.textures.set_default_pack(path);
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

impl std::fmt::Debug for LocalPathTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPathTracer")
            .field("options", &self.options)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraProjector, ProjectionParams};
    use crate::scene::Material;
    use crate::util::IVec3;
    use parking_lot::Mutex;

    fn init_tile(scene: &mut SceneDescription) -> Result<()> {
        let projector = CameraProjector::new(ProjectionParams::default())?;
        scene.set_canvas_size(16, 16);
        scene.camera = projector.compute_camera(0, 0, 0, 0);
        scene.target_spp = 2;
        scene.transparent_sky = true;
        let stone = scene.geometry.add_material(Material::new("stone", [0.5; 3]));
        scene.geometry.fill(IVec3::new(-16, 60, -48), IVec3::new(48, 62, 16), stone);
        Ok(())
    }

    fn tracer(denoise: bool) -> LocalPathTracer {
        LocalPathTracer::new(LocalOptions {
            threads: 2,
            denoise: DenoiseOptions { enabled: denoise, ..Default::default() },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_render_is_deterministic() {
        let tracer = tracer(false);
        let a = tracer.render(&init_tile, &TextureSet::none()).wait().unwrap();
        let b = tracer.render(&init_tile, &TextureSet::none()).wait().unwrap();
        assert_eq!((a.width(), a.height()), (16, 16));
        assert_eq!(a.hash(), b.hash());
        // the ground fills the middle of the tile
        assert_eq!(a.image().get_pixel(8, 8)[3], 255);
    }

    #[test]
    fn test_denoised_render() {
        let tracer = tracer(true);
        let img = tracer.render(&init_tile, &TextureSet::none()).wait().unwrap();
        assert_eq!((img.width(), img.height()), (16, 16));
    }

    #[test]
    fn test_denoiser_gets_guides() {
        struct Recording(Mutex<Option<(bool, bool)>>);
        impl Denoiser for Recording {
            fn apply(
                &self,
                _w: usize,
                _h: usize,
                beauty: &[f32],
                albedo: Option<&[f32]>,
                normal: Option<&[f32]>,
            ) -> Result<Vec<f32>> {
                assert!(beauty.iter().all(|v| (0.0..=1.0).contains(v)));
                *self.0.lock() = Some((albedo.is_some(), normal.is_some()));
                Ok(beauty.to_vec())
            }
        }

        let recording = Arc::new(Recording(Mutex::new(None)));
        let options = LocalOptions {
            denoise: DenoiseOptions {
                enabled: true,
                albedo_samples_per_pixel: 1,
                normal_samples_per_pixel: 1,
            },
            ..Default::default()
        };
        let tracer = LocalPathTracer::with_parts(
            options,
            Arc::new(PathTraceKernel),
            recording.clone(),
            Arc::new(TextureResources::default()),
        )
        .unwrap();
        tracer.render(&init_tile, &TextureSet::none()).wait().unwrap();
        assert_eq!(*recording.0.lock(), Some((true, true)));
    }

    #[test]
    fn test_interrupt_fails_render() {
        let tracer = tracer(false);
        let init = |scene: &mut SceneDescription| -> Result<()> {
            init_tile(scene)?;
            tracer.interrupt();
            Ok(())
        };
        let result = tracer.render(&init, &TextureSet::none()).wait();
        assert!(matches!(result, Err(Error::Interrupted)));
        // later renders are unaffected
        assert!(tracer.render(&init_tile, &TextureSet::none()).wait().is_ok());
    }

    #[test]
    fn test_init_error_propagates() {
        let tracer = tracer(false);
        let init =
            |_: &mut SceneDescription| -> Result<()> { Err(Error::TemplateScene("bad".into())) };
        let result = tracer.render(&init, &TextureSet::none()).wait();
        assert!(matches!(result, Err(Error::TemplateScene(_))));
    }
}
