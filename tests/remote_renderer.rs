//! Render farm backend against a scripted in-process API.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use tracemap::render::remote::{
    ApiClient, ApiRequest, ApiResponse, HttpTransport, Method, RemoteJobRenderer, RemoteOptions,
    UploadStrategy,
};
use tracemap::render::{RenderBackend, RenderedImage, TextureSet};
use tracemap::scene::{Block, Material, SceneDescription};
use tracemap::util::{Error, Result};

/// Fake render farm.
///
/// POST answers come from a script (default 201); each status poll takes
/// the next sample count, repeating the last one.
struct Farm {
    requests: Mutex<Vec<ApiRequest>>,
    posts: Mutex<VecDeque<ApiResponse>>,
    spp: Mutex<VecDeque<u32>>,
    png: Vec<u8>,
}

impl Farm {
    fn new(posts: Vec<ApiResponse>, spp: Vec<u32>) -> Arc<Self> {
        let png = RenderedImage::new(RgbaImage::from_pixel(4, 4, Rgba([9, 8, 7, 255])))
            .encode_png()
            .unwrap();
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            posts: Mutex::new(posts.into()),
            spp: Mutex::new(spp.into()),
            png,
        })
    }

    fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    fn count(&self, method: Method, suffix: &str) -> usize {
        self.requests().iter().filter(|r| r.method == method && r.path.ends_with(suffix)).count()
    }
}

fn job_json(spp: u32) -> String {
    format!(r#"{{"id":"abc","spp":{spp},"targetSpp":100}}"#)
}

impl HttpTransport for Farm {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().push(request.clone());
        Ok(match (request.method, request.path.as_str()) {
            (Method::Post, "/jobs") => {
                self.posts.lock().pop_front().unwrap_or_else(|| ApiResponse::new(201, job_json(0)))
            }
            (Method::Get, "/jobs/abc/latest.png") => ApiResponse::new(200, self.png.clone()),
            (Method::Get, "/jobs/abc") => {
                let mut spp = self.spp.lock();
                let value = if spp.len() > 1 { spp.pop_front() } else { spp.front().copied() };
                ApiResponse::new(200, job_json(value.unwrap_or(0)))
            }
            (Method::Patch, "/jobs/abc") => ApiResponse::new(204, ""),
            _ => ApiResponse::new(404, "not found"),
        })
    }
}

/// Two regions: r.0.0 and r.-1.0.
fn init(scene: &mut SceneDescription) -> Result<()> {
    scene.name = "0_0".into();
    scene.set_canvas_size(4, 4);
    scene.target_spp = 100;
    let stone = scene.geometry.add_material(Material::new("stone", [0.5; 3]));
    scene.geometry.push(Block::new(0, 64, 0, stone));
    scene.geometry.push(Block::new(-1, 64, 0, stone));
    Ok(())
}

fn renderer(farm: Arc<Farm>, upload: UploadStrategy, timeout: Duration) -> RemoteJobRenderer {
    let options = RemoteOptions {
        upload,
        poll_interval: Duration::from_millis(2),
        timeout,
        skymap: None,
    };
    RemoteJobRenderer::new(ApiClient::new(farm), options)
}

#[test]
fn test_full_upload_polls_until_done() {
    let farm = Farm::new(vec![], vec![10, 40, 70, 100]);
    let r = renderer(farm.clone(), UploadStrategy::Full, Duration::from_secs(30));
    let image = r.render(&init, &TextureSet::none()).wait().unwrap();
    assert_eq!((image.width(), image.height()), (4, 4));

    let requests = farm.requests();
    let submit = &requests[0];
    assert_eq!(submit.text("targetSpp"), Some("100"));
    assert_eq!(submit.text("transient"), Some("true"));
    assert_eq!(submit.files("scene").count(), 1);
    assert_eq!(submit.files("geometry").count(), 1);

    assert_eq!(farm.count(Method::Get, "/jobs/abc"), 4);
    assert_eq!(farm.count(Method::Get, "/latest.png"), 1);
    assert_eq!(farm.count(Method::Patch, ""), 0);
    // the picture is fetched last
    assert!(requests.last().unwrap().path.ends_with("/latest.png"));
}

#[test]
fn test_missing_region_is_uploaded_once() {
    let farm = Farm::new(
        vec![ApiResponse::new(400, r#"{"missing":["r.0.0"]}"#), ApiResponse::new(201, job_json(100))],
        vec![100],
    );
    let r = renderer(farm.clone(), UploadStrategy::Incremental, Duration::from_secs(30));
    r.render(&init, &TextureSet::none()).wait().unwrap();

    let posts: Vec<ApiRequest> =
        farm.requests().into_iter().filter(|q| q.method == Method::Post).collect();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].files("region").count(), 0);
    let cached: serde_json::Value =
        serde_json::from_str(posts[0].text("cachedRegions").unwrap()).unwrap();
    assert!(cached.get("r.0.0").is_some());
    assert!(cached.get("r.-1.0").is_some());

    let uploaded: Vec<&str> = posts[1].files("region").map(|(name, _)| name).collect();
    assert_eq!(uploaded, vec!["r.0.0"]);
    // already complete at creation, so no status poll is needed
    assert_eq!(farm.count(Method::Get, "/jobs/abc"), 0);
    assert_eq!(farm.count(Method::Get, "/latest.png"), 1);
}

#[test]
fn test_second_missing_response_fails() {
    let missing = ApiResponse::new(400, r#"{"missing":["r.0.0"]}"#);
    let farm = Farm::new(vec![missing.clone(), missing], vec![100]);
    let r = renderer(farm.clone(), UploadStrategy::Incremental, Duration::from_secs(30));
    let err = r.render(&init, &TextureSet::none()).wait().unwrap_err();
    assert!(matches!(err, Error::ApiStatus { status: 400, .. }));
    assert!(!err.is_retryable());
    assert_eq!(farm.count(Method::Post, "/jobs"), 2);
    assert_eq!(farm.count(Method::Get, "/latest.png"), 0);
}

#[test]
fn test_timeout_cancels_exactly_once() {
    let farm = Farm::new(vec![], vec![0]);
    let r = renderer(farm.clone(), UploadStrategy::Full, Duration::from_millis(40));
    let err = r.render(&init, &TextureSet::none()).wait().unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_retryable());

    let cancels: Vec<ApiRequest> =
        farm.requests().into_iter().filter(|q| q.method == Method::Patch).collect();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].path, "/jobs/abc");
    assert_eq!(cancels[0].text("action"), Some("cancel"));
    assert_eq!(farm.count(Method::Get, "/latest.png"), 0);
}

#[test]
fn test_render_returns_before_job_finishes() {
    let farm = Farm::new(vec![], vec![0]);
    let r = renderer(farm.clone(), UploadStrategy::Full, Duration::from_secs(30));
    let pending = r.render(&init, &TextureSet::none());
    assert!(pending.wait_timeout(Duration::from_millis(20)).is_none());

    // many jobs in flight at once, each on its own poll thread
    let others: Vec<_> = (0..4).map(|_| r.render(&init, &TextureSet::none())).collect();
    *farm.spp.lock() = vec![100].into();
    assert!(pending.wait().is_ok());
    for other in others {
        assert!(other.wait().is_ok());
    }
}

#[test]
fn test_rejected_job_is_api_failure() {
    let farm = Farm::new(vec![ApiResponse::new(503, "maintenance")], vec![100]);
    let r = renderer(farm, UploadStrategy::Full, Duration::from_secs(30));
    let err = r.render(&init, &TextureSet::none()).wait().unwrap_err();
    assert!(matches!(err, Error::ApiStatus { status: 503, .. }));
}
