//! Integration tests for API server
//!
//! Each test starts a server on an ephemeral port over a temporary video,
//! output and binaries directory, then drives it with real HTTP requests.

use image::Rgb;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::net::TcpListener;
use video_pipeline_api_server::{serve, ApiState};
use video_pipeline_codec::PlanarWriter;
use video_pipeline_common::Frame;
use video_pipeline_core::PipelineConfig;

const CLIP: &str = "clip_64x48_10.yuv";
const TICKS: u8 = 4;

struct TestServer {
    addr: SocketAddr,
    dir: TempDir,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn output_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("output")
    }

    async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

fn write_clip(path: &Path) {
    let mut writer = PlanarWriter::create(path).unwrap();
    for i in 0..TICKS {
        let frame = Frame::from_fn(64, 48, |x, y| {
            Rgb([(x * 4) as u8, (y * 5) as u8, ((x + y) as u8).wrapping_mul(i + 1)])
        });
        writer.write_frame(&frame).unwrap();
    }
    writer.finish().unwrap();
}

async fn start() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        video_dir: dir.path().join("videos"),
        output_dir: dir.path().join("output"),
        binaries_dir: dir.path().join("binaries"),
        ..PipelineConfig::default()
    };
    std::fs::create_dir_all(&config.video_dir).unwrap();
    std::fs::create_dir_all(&config.binaries_dir).unwrap();
    write_clip(&config.video_dir.join(CLIP));

    let state = ApiState::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });

    TestServer {
        addr,
        dir,
        client: reqwest::Client::new(),
    }
}

fn node(id: &str, class: &str, source: &[&str], params: Value) -> Value {
    let parameters: Vec<Value> = params
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| json!({ "key": k, "value": v }))
                .collect()
        })
        .unwrap_or_default();
    json!({ "id": id, "module_class": class, "source": source, "parameters": parameters })
}

fn two_sink_request(right_width: u32) -> Value {
    json!({
        "modules": [
            node("src", "video_source", &[], json!({ "path": CLIP })),
            node("soft", "blur", &["src"], json!({ "kernel_size": 3 })),
            node("small", "resize", &["src"], json!({ "width": right_width, "height": 48 })),
            node("left", "result", &["soft"], json!({ "video_player": "left" })),
            node("right", "result", &["small"], json!({ "video_player": "right", "path": "cmp" })),
        ]
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_module_listing() {
    let server = start().await;
    let (status, body) = server.get("/api/v1/modules").await;
    assert_eq!(status, 200);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    for expected in ["blur", "color", "resize", "result", "video_source"] {
        assert!(ids.contains(&expected), "{expected} missing from {ids:?}");
    }
}

#[tokio::test]
async fn test_two_sink_pipeline() {
    let server = start().await;
    let (status, body) = server.post("/api/v1/pipeline", &two_sink_request(64)).await;
    assert_eq!(status, 200, "{body}");

    let left = body["left"].as_str().unwrap();
    let right = body["right"].as_str().unwrap();
    let interleaved = body["interleaved"].as_str().unwrap();
    assert!(left.ends_with("_64x48.yuv"), "{left}");
    assert!(right.starts_with("cmp-"), "{right}");
    assert!(!interleaved.is_empty());

    let frame_len = 64 * 48 * 3 / 2;
    let size = |name: &str| std::fs::metadata(server.output_dir().join(name)).unwrap().len();
    assert_eq!(size(left), u64::from(TICKS) * frame_len);
    assert_eq!(size(right), u64::from(TICKS) * frame_len);
    assert_eq!(size(interleaved), 2 * u64::from(TICKS) * frame_len);

    let metrics = body["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), usize::from(TICKS));
    assert!(metrics.iter().all(|m| m["status"] == "ok"));

    // Stored artifacts are comparable by locator
    let (status, compared) = server
        .post(
            "/api/v1/metrics/compare",
            &json!({ "left": left, "right": left, "max_frames": 2 }),
        )
        .await;
    assert_eq!(status, 200, "{compared}");
    assert_eq!(compared["frames"], 2);
    assert_eq!(compared["metrics"][0]["psnr"], 100.0);
}

#[tokio::test]
async fn test_mismatched_sides_skip_interleaving() {
    let server = start().await;
    let (status, body) = server.post("/api/v1/pipeline", &two_sink_request(32)).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["interleaved"], "");
    let metrics = body["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), usize::from(TICKS));
    assert!(metrics.iter().all(|m| m["status"] == "message"));
}

#[tokio::test]
async fn test_graph_errors_are_listed() {
    let server = start().await;
    let request = json!({
        "modules": [
            node("src", "video_source", &[], json!({ "path": CLIP })),
            node("a", "blur", &["b"], json!({})),
            node("b", "blur", &["a"], json!({})),
        ]
    });
    let (status, body) = server.post("/api/v1/pipeline", &request).await;
    assert_eq!(status, 422);
    assert_eq!(body["category"], "graph");
    let kinds: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"cycle_detected"), "{kinds:?}");
    assert!(kinds.contains(&"no_sink"), "{kinds:?}");
}

#[tokio::test]
async fn test_parameter_errors() {
    let server = start().await;
    let request = json!({
        "modules": [
            node("src", "video_source", &[], json!({ "path": CLIP })),
            node("small", "resize", &["src"], json!({ "width": 8 })),
            node("out", "result", &["small"], json!({})),
        ]
    });
    let (status, body) = server.post("/api/v1/pipeline", &request).await;
    assert_eq!(status, 422);
    assert_eq!(body["category"], "parameter");
    assert_eq!(body["details"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_video_is_not_found() {
    let server = start().await;
    let request = json!({
        "modules": [
            node("src", "video_source", &[], json!({ "path": "absent_64x48.yuv" })),
            node("out", "result", &["src"], json!({})),
        ]
    });
    let (status, body) = server.post("/api/v1/pipeline", &request).await;
    assert_eq!(status, 404);
    assert_eq!(body["category"], "resource");
}

#[tokio::test]
async fn test_compare_rejects_bad_locators() {
    let server = start().await;
    let (status, body) = server
        .post(
            "/api/v1/metrics/compare",
            &json!({ "left": "../clip_64x48.yuv", "right": CLIP }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["category"], "request");

    let (status, _) = server
        .post(
            "/api/v1/metrics/compare",
            &json!({ "left": "gone_64x48.yuv", "right": CLIP }),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_binaries_endpoints() {
    let server = start().await;
    let (status, body) = server.get("/api/v1/binaries").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!([]));

    let (status, body) = server.post("/api/v1/binaries/denoise/install", &json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["category"], "resource");
}
