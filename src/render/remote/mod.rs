//! Rendering on a remote render farm.
//!
//! [`RemoteJobRenderer::render`] initializes the scene on the caller's
//! thread, then hands the upload and the poll loop to a background thread
//! and returns at once. The poll loop checks the job every
//! [`RemoteOptions::poll_interval`] until the target sample count is
//! reached, then fetches the picture exactly once. On timeout or
//! [`shutdown`](RemoteJobRenderer::shutdown) it sends one best-effort cancel
//! and fails the render.

pub mod api;
pub mod job;
pub mod transport;

pub use api::{ApiClient, JobSubmission, RegionFile};
pub use job::{JobStatus, RenderJob};
pub use transport::{ApiRequest, ApiResponse, FormPart, HttpTransport, Method, ReqwestTransport};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{PendingRender, RenderBackend, RenderedImage, SceneInit, TextureResources, TextureSet};
use crate::scene::{encode_geometry, SceneDescription};
use crate::util::{Error, Result};

/// How geometry reaches the render farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Whole geometry in the job request.
    Full,
    /// Region checksums first, region files only when the farm lacks them.
    #[default]
    Incremental,
}

/// Remote backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    pub upload: UploadStrategy,
    pub poll_interval: Duration,
    /// Upper bound from submission to a finished job.
    pub timeout: Duration,
    /// Sky map attached to every job.
    pub skymap: Option<PathBuf>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            upload: UploadStrategy::Incremental,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3600),
            skymap: None,
        }
    }
}

/// Geometry payload of one job.
enum Upload {
    Full(Vec<u8>),
    Incremental(Vec<RegionFile>),
}

/// Renders by submitting jobs to a render farm.
pub struct RemoteJobRenderer {
    client: ApiClient,
    options: RemoteOptions,
    textures: Arc<TextureResources>,
    shutdown: Arc<AtomicBool>,
}

impl RemoteJobRenderer {
    pub fn new(client: ApiClient, options: RemoteOptions) -> Self {
        Self {
            client,
            options,
            textures: Arc::new(TextureResources::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Renderer talking HTTP to `api_url`.
    pub fn connect(api_url: &str, api_key: &str, options: RemoteOptions) -> Result<Self> {
        let transport = ReqwestTransport::new(api_url, api_key)?;
        Ok(Self::new(ApiClient::new(Arc::new(transport)), options))
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Cancel every running job and fail its render with [`Error::Interrupted`].
    ///
    /// Renders started afterwards fail immediately.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!("remote renderer shutting down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run scene initialization and build the job payload.
    fn prepare(
        &self,
        initialize_scene: SceneInit<'_>,
        textures: &TextureSet,
    ) -> Result<(String, JobSubmission, Upload)> {
        if self.is_shut_down() {
            return Err(Error::Interrupted);
        }
        let mut scene = SceneDescription::new();
        initialize_scene(&mut scene)?;
        scene.validate()?;

        let texturepack = self
            .textures
            .resolve(textures)
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        let skymap = match &self.options.skymap {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    Error::config(format!("cannot read skymap {}: {e}", path.display()))
                })?;
                let name = path
                    .file_name()
                    .map_or_else(|| "skymap".to_string(), |n| n.to_string_lossy().into_owned());
                Some((name, bytes))
            }
            None => None,
        };
        let submission = JobSubmission {
            scene: serde_json::to_vec(&scene.to_json()?)?,
            target_spp: scene.target_spp,
            skymap,
            texturepack,
        };

        let upload = match self.options.upload {
            UploadStrategy::Full => Upload::Full(encode_geometry(&scene.geometry)?),
            UploadStrategy::Incremental => {
                let mut files = Vec::new();
                for (pos, region) in scene.geometry.split_regions() {
                    files.push(RegionFile::new(pos.name(), encode_geometry(&region)?));
                }
                Upload::Incremental(files)
            }
        };
        debug!(name = %scene.name, blocks = scene.geometry.len(), "remote job prepared");
        Ok((scene.name, submission, upload))
    }
}

impl RenderBackend for RemoteJobRenderer {
    fn render(&self, initialize_scene: SceneInit<'_>, textures: &TextureSet) -> PendingRender {
        let (name, submission, upload) = match self.prepare(initialize_scene, textures) {
            Ok(prepared) => prepared,
            Err(e) => return PendingRender::ready(Err(e)),
        };

        let (tx, pending) = PendingRender::channel();
        let poller = Poller {
            client: self.client.clone(),
            poll_interval: self.options.poll_interval,
            timeout: self.options.timeout,
            shutdown: Arc::clone(&self.shutdown),
        };
        let spawned = thread::Builder::new()
            .name(format!("tracemap-poll-{name}"))
            .spawn(move || {
                let result = poller.run(&submission, upload);
                if let Err(e) = &result {
                    debug!(error = %e, "remote render failed");
                }
                // the caller may have stopped waiting
                let _ = tx.send(result);
            });
        match spawned {
            Ok(_) => pending,
            Err(e) => PendingRender::ready(Err(Error::Io(e))),
        }
    }

    fn set_default_texturepack(&self, path: Option<PathBuf>) {
        self.textures.set_default_pack(path);
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

impl std::fmt::Debug for RemoteJobRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteJobRenderer")
            .field("options", &self.options)
            .field("shutdown", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Drives one job from submission to picture.
struct Poller {
    client: ApiClient,
    poll_interval: Duration,
    timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Poller {
    fn run(&self, submission: &JobSubmission, upload: Upload) -> Result<RenderedImage> {
        let started = Instant::now();
        let mut job = match upload {
            Upload::Full(geometry) => self.client.create_job_full(submission, &geometry)?,
            Upload::Incremental(regions) => {
                self.client.create_job_incremental(submission, &regions)?
            }
        };
        let deadline = started + self.timeout;

        loop {
            match job.status() {
                JobStatus::Canceled | JobStatus::Errored => {
                    return Err(Error::ApiResponse(format!(
                        "job {} ended as {}",
                        job.id,
                        job.status()
                    )));
                }
                JobStatus::Done => break,
                JobStatus::Pending | JobStatus::Running if job.is_complete() => break,
                JobStatus::Pending | JobStatus::Running => {}
            }
            if self.shutdown.load(Ordering::SeqCst) {
                self.cancel(&job);
                return Err(Error::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(job = %job.id, spp = job.spp, target_spp = job.target_spp, "render job timed out");
                self.cancel(&job);
                return Err(Error::Timeout { millis: self.timeout.as_millis() as u64 });
            }

            thread::sleep(self.poll_interval.min(deadline - now));
            let polled = match self.client.get_job(&job.id) {
                Ok(polled) => polled,
                Err(e) => {
                    warn!(job = %job.id, error = %e, "polling render job failed");
                    self.cancel(&job);
                    return Err(e);
                }
            };
            job.advance(polled);
            debug!(job = %job.id, spp = job.spp, target_spp = job.target_spp, "job progress");
        }

        let image = self.client.get_picture(&job.id)?;
        info!(
            job = %job.id,
            spp = job.spp,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "remote render finished"
        );
        Ok(image)
    }

    fn cancel(&self, job: &RenderJob) {
        if let Err(e) = self.client.cancel_job(&job.id) {
            warn!(job = %job.id, error = %e, "could not cancel render job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Jobs stay at zero samples forever.
    #[derive(Default)]
    struct Stalled {
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl HttpTransport for Stalled {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
            self.requests.lock().push(request.clone());
            Ok(match request.method {
                Method::Post => ApiResponse::new(201, r#"{"_id":"j1","spp":0,"targetSpp":50}"#),
                Method::Get => ApiResponse::new(200, r#"{"_id":"j1","spp":0,"targetSpp":50}"#),
                Method::Patch => ApiResponse::new(204, ""),
            })
        }
    }

    fn init(scene: &mut SceneDescription) -> Result<()> {
        scene.set_canvas_size(8, 8);
        scene.target_spp = 50;
        Ok(())
    }

    fn renderer(transport: Arc<Stalled>, options: RemoteOptions) -> RemoteJobRenderer {
        RemoteJobRenderer::new(ApiClient::new(transport), options)
    }

    #[test]
    fn test_shutdown_cancels_running_job() {
        let transport = Arc::new(Stalled::default());
        let options = RemoteOptions {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let renderer = renderer(transport.clone(), options);
        let pending = renderer.render(&init, &TextureSet::none());
        assert!(pending.wait_timeout(Duration::from_millis(30)).is_none());

        renderer.shutdown();
        assert!(matches!(pending.wait(), Err(Error::Interrupted)));
        let cancels =
            transport.requests.lock().iter().filter(|r| r.method == Method::Patch).count();
        assert_eq!(cancels, 1);

        // nothing is submitted after shutdown
        let before = transport.requests.lock().len();
        assert!(matches!(renderer.render(&init, &TextureSet::none()).wait(), Err(Error::Interrupted)));
        assert_eq!(transport.requests.lock().len(), before);
    }

    #[test]
    fn test_poll_failure_cancels_job() {
        /// Accepts the job, then the status endpoint goes away.
        #[derive(Default)]
        struct Unreachable {
            requests: Mutex<Vec<ApiRequest>>,
        }
        impl HttpTransport for Unreachable {
            fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
                self.requests.lock().push(request.clone());
                match request.method {
                    Method::Post => {
                        Ok(ApiResponse::new(201, r#"{"_id":"j2","spp":0,"targetSpp":50}"#))
                    }
                    Method::Get => Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "reset",
                    ))),
                    Method::Patch => Ok(ApiResponse::new(204, "")),
                }
            }
        }

        let transport = Arc::new(Unreachable::default());
        let options = RemoteOptions { poll_interval: Duration::from_millis(1), ..Default::default() };
        let renderer = RemoteJobRenderer::new(ApiClient::new(transport.clone()), options);
        let err = renderer.render(&init, &TextureSet::none()).wait().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());

        let requests = transport.requests.lock();
        let cancels: Vec<&ApiRequest> =
            requests.iter().filter(|r| r.method == Method::Patch).collect();
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0].path, "/jobs/j2");
    }

    #[test]
    fn test_texturepack_and_full_upload() {
        let transport = Arc::new(Stalled::default());
        let options = RemoteOptions {
            upload: UploadStrategy::Full,
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(5),
            ..Default::default()
        };
        let renderer = renderer(transport.clone(), options);
        renderer.set_default_texturepack(Some(PathBuf::from("/packs/Faithful")));
        let result = renderer.render(&init, &TextureSet::none()).wait();
        assert!(matches!(result, Err(Error::Timeout { .. })));

        let requests = transport.requests.lock();
        let submit = &requests[0];
        assert_eq!(submit.text("texturepack"), Some("Faithful"));
        assert_eq!(submit.files("geometry").count(), 1);
        assert!(submit.text("cachedRegions").is_none());
    }
}
