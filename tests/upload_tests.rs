//! HTTP-level tests for the upload page, driven through the router with a
//! stub classifier so no model runtime is needed.

use std::{collections::HashMap, fs, io::Cursor, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use tempfile::TempDir;
use tower::ServiceExt;

use image_classifier_service::{
    AppConfig, Classifier, ModelRegistry, ServiceError, build_router,
    model::ModelMetadata, preprocess::InputTensor,
};

const BOUNDARY: &str = "X-UPLOAD-BOUNDARY";
const NUM_CLASSES: usize = 10;

/// Scores by mean pixel value and remembers the last input shape.
struct MeanClassifier {
    seen_shape: Arc<Mutex<Option<[usize; 4]>>>,
}

impl Classifier for MeanClassifier {
    fn scores(&self, input: &InputTensor) -> Result<Vec<f32>, ServiceError> {
        *self.seen_shape.lock() = Some(input.shape());
        let mean = input.data().iter().sum::<f32>() / input.data().len() as f32;
        let hot = (mean as usize) % NUM_CLASSES;
        Ok((0..NUM_CLASSES)
            .map(|i| if i == hot { 0.9 } else { 0.01 })
            .collect())
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: "mean".into(),
            path: PathBuf::from("mean.pt"),
            size_bytes: 0,
            device: "cpu".into(),
            input_shape: [1, 50, 50, 3],
        }
    }
}

struct Harness {
    _dir: TempDir,
    media_root: PathBuf,
    registry: Arc<ModelRegistry>,
    router: Router,
    seen_shape: Arc<Mutex<Option<[usize; 4]>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_vars(&[])
    }

    fn with_vars(extra: &[(&'static str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let media_root = dir.path().join("media");
        fs::create_dir(&media_root).unwrap();

        let mut vars: HashMap<&str, String> = HashMap::from([
            ("MEDIA_ROOT", media_root.display().to_string()),
            ("MEDIA_URL", "/media/".to_string()),
        ]);
        vars.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let seen_shape = Arc::new(Mutex::new(None));
        let shape_slot = seen_shape.clone();
        let registry = Arc::new(
            ModelRegistry::initialize(move || {
                Ok(Arc::new(MeanClassifier {
                    seen_shape: shape_slot.clone(),
                }) as Arc<dyn Classifier>)
            })
            .unwrap(),
        );
        let router = build_router(Arc::new(config), registry.clone());

        Self {
            _dir: dir,
            media_root,
            registry,
            router,
            seen_shape,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn stored_files(&self) -> usize {
        fs::read_dir(&self.media_root).unwrap().count()
    }
}

fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

fn multipart_request(field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn index_renders_upload_form() {
    let harness = Harness::new();
    let (status, body) = harness.send(get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("enctype=\"multipart/form-data\""));
    assert!(body.contains("name=\"image\""));
}

#[tokio::test]
async fn missing_image_field_reports_no_image_selected() {
    let harness = Harness::new();
    let request = multipart_request("document", "test.png", &solid_png(10, 10, [0, 0, 0]));

    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("No Image Selected"));
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn non_multipart_post_reports_no_image_selected() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("image="))
        .unwrap();

    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("No Image Selected"));
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn empty_file_part_reports_no_image_selected() {
    let harness = Harness::new();
    let (_, body) = harness.send(multipart_request("image", "", b"")).await;
    assert!(body.contains("No Image Selected"));
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn red_png_is_stored_and_classified() {
    let harness = Harness::new();
    let png = solid_png(200, 200, [255, 0, 0]);

    let (status, body) = harness.send(multipart_request("image", "test.png", &png)).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let stored = harness.media_root.join("test.png");
    assert_eq!(fs::read(&stored).unwrap(), png);
    assert_eq!(*harness.seen_shape.lock(), Some([1, 50, 50, 3]));
    assert!(body.contains("src=\"/media/test.png\""));

    let start = body.find("<span id=\"prediction\">").unwrap() + "<span id=\"prediction\">".len();
    let end = start + body[start..].find("</span>").unwrap();
    let class_index: usize = body[start..end].parse().unwrap();
    assert!(class_index < NUM_CLASSES);
}

#[tokio::test]
async fn same_image_gives_same_prediction() {
    let harness = Harness::new();
    let png = solid_png(120, 80, [12, 200, 40]);

    let (_, first) = harness.send(multipart_request("image", "a.png", &png)).await;
    let (_, second) = harness.send(multipart_request("image", "a.png", &png)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn reupload_replaces_previous_file() {
    let harness = Harness::new();
    let first = solid_png(200, 200, [255, 0, 0]);
    let second = solid_png(30, 30, [0, 0, 255]);

    let (status, _) = harness.send(multipart_request("image", "test.png", &first)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = harness.send(multipart_request("image", "test.png", &second)).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(fs::read(harness.media_root.join("test.png")).unwrap(), second);
    assert_eq!(harness.stored_files(), 1);
}

#[tokio::test]
async fn traversal_filename_stays_in_media_root() {
    let harness = Harness::new();
    let png = solid_png(20, 20, [1, 2, 3]);

    let (status, body) = harness
        .send(multipart_request("image", "../../escape.png", &png))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(harness.media_root.join("escape.png").exists());
    assert!(!harness.media_root.parent().unwrap().join("escape.png").exists());
}

#[tokio::test]
async fn unusable_filename_is_rejected() {
    let harness = Harness::new();
    let (status, body) = harness
        .send(multipart_request("image", "..", &solid_png(5, 5, [0, 0, 0])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("The uploaded file name is not allowed"));
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn undecodable_upload_is_invalid_image_without_leaking_paths() {
    let harness = Harness::new();
    let (status, body) = harness
        .send(multipart_request("image", "notes.png", b"this is not an image"))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.contains("The uploaded file is not a readable image"));
    assert!(!body.contains(&harness.media_root.display().to_string()));
}

#[tokio::test]
async fn oversized_body_is_rejected_without_storing() {
    let harness = Harness::with_vars(&[("BODY_LIMIT_MB", "1")]);
    let payload = vec![7u8; 2 * 1024 * 1024];

    let (status, body) = harness
        .send(multipart_request("image", "big.png", &payload))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("The upload could not be read"));
    assert_eq!(harness.stored_files(), 0);
}

#[tokio::test]
async fn stored_upload_is_served_from_media_url() {
    let harness = Harness::new();
    let png = solid_png(16, 16, [9, 9, 9]);
    harness.send(multipart_request("image", "served.png", &png)).await;

    let response = harness.router.clone().oneshot(get("/media/served.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), png.as_slice());
}

#[tokio::test]
async fn health_and_metadata_report_loaded_model() {
    let harness = Harness::new();
    let (status, body) = harness.send(get("/health")).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

    let (status, body) = harness.send(get("/metadata")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["loaded"], true);
    assert_eq!(json["model"]["name"], "mean");
}

#[tokio::test]
async fn reload_endpoint_returns_metadata() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/model/reload")
        .body(Body::empty())
        .unwrap();

    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["input_shape"], serde_json::json!([1, 50, 50, 3]));
}

#[tokio::test]
async fn upload_after_shutdown_is_model_unavailable() {
    let harness = Harness::new();
    harness.registry.shutdown();

    let (status, body) = harness
        .send(multipart_request("image", "late.png", &solid_png(8, 8, [0, 0, 0])))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("The classification model is not available"));
}
