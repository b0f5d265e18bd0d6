//! Render pass sequencing.
//!
//! `Init → [Normal → Albedo]? → Beauty → Done`. The normal and albedo
//! passes only run with denoising enabled and a positive sample target;
//! a normal pass is never scheduled without an albedo pass after it.

use std::fmt;

use tracing::warn;

/// What a pass accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    /// First-hit surface normals.
    Normal,
    /// First-hit surface colour.
    Albedo,
    /// Full path-traced radiance.
    Beauty,
}

impl RenderPass {
    /// Stable id used to derive sample seeds.
    pub fn id(self) -> u64 {
        match self {
            Self::Normal => 1,
            Self::Albedo => 2,
            Self::Beauty => 3,
        }
    }
}

impl fmt::Display for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Albedo => "albedo",
            Self::Beauty => "beauty",
        })
    }
}

/// Progress of one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Init,
    Running(RenderPass),
    Done,
}

/// Pass targets for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPlan {
    /// Samples per pixel of the normal pass, 0 when skipped.
    pub normal_spp: u32,
    /// Samples per pixel of the albedo pass, 0 when skipped.
    pub albedo_spp: u32,
    pub beauty_spp: u32,
}

impl PassPlan {
    /// Decide which passes run.
    pub fn new(denoise: bool, normal_spp: u32, albedo_spp: u32, beauty_spp: u32) -> Self {
        if !denoise {
            return Self { normal_spp: 0, albedo_spp: 0, beauty_spp };
        }
        let normal_spp = if normal_spp > 0 && albedo_spp == 0 {
            warn!("normal pass needs an albedo pass, skipping it");
            0
        } else {
            normal_spp
        };
        Self { normal_spp, albedo_spp, beauty_spp }
    }

    /// Sample target of a pass.
    pub fn target(&self, pass: RenderPass) -> u32 {
        match pass {
            RenderPass::Normal => self.normal_spp,
            RenderPass::Albedo => self.albedo_spp,
            RenderPass::Beauty => self.beauty_spp,
        }
    }

    /// Transition after `state` has completed.
    pub fn next(&self, state: PassState) -> PassState {
        match state {
            PassState::Init if self.normal_spp > 0 => PassState::Running(RenderPass::Normal),
            PassState::Init | PassState::Running(RenderPass::Normal) if self.albedo_spp > 0 => {
                PassState::Running(RenderPass::Albedo)
            }
            PassState::Init
            | PassState::Running(RenderPass::Normal)
            | PassState::Running(RenderPass::Albedo) => PassState::Running(RenderPass::Beauty),
            PassState::Running(RenderPass::Beauty) | PassState::Done => PassState::Done,
        }
    }

    /// All passes in order.
    pub fn passes(&self) -> Vec<RenderPass> {
        let mut out = Vec::with_capacity(3);
        let mut state = self.next(PassState::Init);
        while let PassState::Running(pass) = state {
            out.push(pass);
            state = self.next(state);
        }
        out
    }
}
