//! Render farm API calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use super::job::RenderJob;
use super::transport::{ApiRequest, ApiResponse, FormPart, HttpTransport};
use crate::render::RenderedImage;
use crate::util::{ContentHash, Error, Result};

/// Parts of a job submission shared by both upload strategies.
#[derive(Debug, Clone, Default)]
pub struct JobSubmission {
    /// JSON scene descriptor.
    pub scene: Vec<u8>,
    pub target_spp: u32,
    /// File name and bytes.
    pub skymap: Option<(String, Vec<u8>)>,
    /// Texture pack name known to the render farm.
    pub texturepack: Option<String>,
}

impl JobSubmission {
    fn base_form(&self) -> Vec<FormPart> {
        vec![
            FormPart::file("scene", "scene.json", self.scene.clone()),
            FormPart::text("targetSpp", self.target_spp.to_string()),
            FormPart::text("transient", "true"),
        ]
    }

    fn extra_form(&self, form: &mut Vec<FormPart>) {
        if let Some((name, bytes)) = &self.skymap {
            form.push(FormPart::file("skymap", name.clone(), bytes.clone()));
        }
        if let Some(pack) = &self.texturepack {
            form.push(FormPart::text("texturepack", pack.clone()));
        }
    }
}

/// Serialized geometry of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFile {
    /// Region name, `r.<x>.<z>`.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RegionFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }

    /// Hex MD5 of the file contents.
    pub fn checksum(&self) -> String {
        ContentHash::of(&self.bytes).to_hex()
    }
}

#[derive(Debug, Deserialize)]
struct MissingRegions {
    missing: Option<Vec<String>>,
}

/// Typed calls against the render farm API.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Submit scene and full geometry in one request.
    pub fn create_job_full(&self, submission: &JobSubmission, geometry: &[u8]) -> Result<RenderJob> {
        let mut form = submission.base_form();
        form.push(FormPart::file("geometry", "scene.tmgeo", geometry.to_vec()));
        submission.extra_form(&mut form);

        let response = self.transport.send(&ApiRequest::post("/jobs", form))?;
        expect_created(response)
    }

    /// Submit region checksums; upload only the regions the farm lacks.
    ///
    /// At most one follow-up request is made. A second `missing` answer
    /// is a terminal failure.
    pub fn create_job_incremental(
        &self,
        submission: &JobSubmission,
        regions: &[RegionFile],
    ) -> Result<RenderJob> {
        let checksums: BTreeMap<String, String> =
            regions.iter().map(|r| (r.name.clone(), r.checksum())).collect();

        let mut form = submission.base_form();
        form.push(FormPart::text("cachedRegions", serde_json::to_string(&checksums)?));
        submission.extra_form(&mut form);

        let response = self.transport.send(&ApiRequest::post("/jobs", form))?;
        if response.status != 400 {
            return expect_created(response);
        }

        let missing = parse_missing(&response)?;
        info!(count = missing.len(), "render farm is missing regions, uploading them");
        let files: Vec<&RegionFile> =
            regions.iter().filter(|r| missing.iter().any(|m| *m == r.name)).collect();

        // regions sent as files are not listed as cached
        let cached: BTreeMap<&String, &String> = checksums
            .iter()
            .filter(|(name, _)| !files.iter().any(|f| &f.name == *name))
            .collect();

        let mut form = submission.base_form();
        form.push(FormPart::text("cachedRegions", serde_json::to_string(&cached)?));
        for file in &files {
            form.push(FormPart::file("region", file.name.clone(), file.bytes.clone()));
        }
        submission.extra_form(&mut form);

        let response = self.transport.send(&ApiRequest::post("/jobs", form))?;
        expect_created(response)
    }

    pub fn get_job(&self, id: &str) -> Result<RenderJob> {
        let response = self.transport.send(&ApiRequest::get(format!("/jobs/{id}")))?;
        if response.status != 200 {
            return Err(status_error(&response));
        }
        parse_job(&response)
    }

    pub fn cancel_job(&self, id: &str) -> Result<()> {
        let form = vec![FormPart::text("action", "cancel")];
        let response = self.transport.send(&ApiRequest::patch(format!("/jobs/{id}"), form))?;
        if response.status != 204 {
            return Err(status_error(&response));
        }
        debug!(job = id, "job canceled");
        Ok(())
    }

    /// Latest rendered image of a job.
    pub fn get_picture(&self, id: &str) -> Result<RenderedImage> {
        let response = self.transport.send(&ApiRequest::get(format!("/jobs/{id}/latest.png")))?;
        if response.status != 200 {
            return Err(status_error(&response));
        }
        RenderedImage::from_png(&response.body)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").finish_non_exhaustive()
    }
}

fn expect_created(response: ApiResponse) -> Result<RenderJob> {
    if response.status != 201 {
        return Err(status_error(&response));
    }
    let job = parse_job(&response)?;
    info!(job = %job.id, spp = job.spp, target_spp = job.target_spp, "render job created");
    Ok(job)
}

fn parse_job(response: &ApiResponse) -> Result<RenderJob> {
    serde_json::from_slice(&response.body)
        .map_err(|e| Error::ApiResponse(format!("invalid job: {e}: {}", response.text())))
}

fn parse_missing(response: &ApiResponse) -> Result<Vec<String>> {
    let body: Option<MissingRegions> = serde_json::from_slice(&response.body).ok();
    match body.and_then(|b| b.missing) {
        Some(missing) => Ok(missing),
        None => Err(status_error(response)),
    }
}

fn status_error(response: &ApiResponse) -> Error {
    Error::ApiStatus { status: response.status, message: response.text() }
}
