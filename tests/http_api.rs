use std::io::Cursor;

use audio_overlay::{router, AppState, ServerConfig};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tempfile::TempDir;
use tower::ServiceExt;

const RATE: u32 = 8_000;
const BOUNDARY: &str = "audio-overlay-test-boundary";

/// Создает тестовый WAV с синусом 440 Гц
fn wav_fixture(secs: f32, amplitude: f32) -> Vec<u8> {
    wav_fixture_at(RATE, secs, amplitude)
}

/// То же с заданной частотой дискретизации
fn wav_fixture_at(rate: u32, secs: f32, amplitude: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (secs * rate as f32) as usize;
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let sample = (t * 440.0 * std::f32::consts::TAU).sin() * amplitude;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Сборщик тела multipart-запроса
#[derive(Default)]
struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// Две секунды речи над секундой музыки, без затуханий
fn standard_form() -> MultipartForm {
    MultipartForm::default()
        .file("speech_file", "speech.wav", &wav_fixture(2.0, 0.3))
        .file("music_file", "music.wav", &wav_fixture(1.0, 0.2))
        .text("music_continue_after_speech", "1")
        .text("fade_in_duration", "0")
        .text("fade_out_duration", "0")
        .text("output_format", "wav")
}

struct TestApp {
    app: Router,
    temp_root: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut ServerConfig)) -> Self {
        let temp_root = tempfile::tempdir().unwrap();
        let mut config = ServerConfig {
            temp_dir: Some(temp_root.path().to_path_buf()),
            ..ServerConfig::default()
        };
        adjust(&mut config);
        Self {
            app: router(AppState::new(config)),
            temp_root,
        }
    }

    async fn post(&self, uri: &str, body: Vec<u8>, extra: &[(header::HeaderName, &str)]) -> Response {
        let mut builder = Request::builder().method("POST").uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        for (name, value) in extra {
            builder = builder.header(name.clone(), *value);
        }
        let request = builder.body(Body::from(body)).unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.temp_root.path()).unwrap().count()
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn wav_frames(bytes: &[u8]) -> u32 {
    hound::WavReader::new(Cursor::new(bytes)).unwrap().duration()
}

#[tokio::test]
async fn test_overlay_returns_wav_attachment() {
    let app = TestApp::new();
    let response = app.post("/overlay/", standard_form().finish(), &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"combined_audio_"));
    assert!(disposition.ends_with(".wav\""));

    let bytes = body_bytes(response).await;
    // 2 с речи + 1 с музыки после неё
    assert_eq!(wav_frames(&bytes), 3 * RATE);
    assert_eq!(app.leftover_files(), 0);
}

#[tokio::test]
async fn test_path_without_trailing_slash() {
    let app = TestApp::new();
    let response = app.post("/overlay", standard_form().finish(), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_json_envelope_has_identical_payload() {
    let app = TestApp::new();

    let binary = body_bytes(app.post("/overlay", standard_form().finish(), &[]).await).await;

    let body = standard_form().text("response_format", "json").finish();
    let response = app.post("/overlay", body, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    let envelope = body_json(response).await;
    assert_eq!(envelope["content_type"], "audio/wav");
    assert_eq!(envelope["size_bytes"], binary.len());
    assert_eq!(envelope["duration_seconds"], 3.0);
    assert!(envelope["filename"]
        .as_str()
        .unwrap()
        .starts_with("combined_audio_"));

    let data = envelope["data"].as_str().unwrap();
    let payload = data.strip_prefix("data:audio/wav;base64,").unwrap();
    assert_eq!(BASE64.decode(payload).unwrap(), binary);
}

#[tokio::test]
async fn test_automation_client_gets_json() {
    let app = TestApp::new();
    let response = app
        .post(
            "/overlay",
            standard_form().finish(),
            &[(header::USER_AGENT, "Make/production")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let envelope = body_json(response).await;
    assert!(envelope["data"].as_str().unwrap().starts_with("data:audio/wav;base64,"));
}

#[tokio::test]
async fn test_mp3_output() {
    let app = TestApp::new();
    let body = MultipartForm::default()
        .file("speech_file", "speech.wav", &wav_fixture(2.0, 0.3))
        .file("music_file", "music.wav", &wav_fixture_at(44_100, 4.0, 0.2))
        .finish();
    let response = app.post("/overlay/", body, &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert!(!body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_query_parameters_and_form_precedence() {
    let app = TestApp::new();

    // Только в строке запроса: 2 с речи + 2 с хвоста
    let body = MultipartForm::default()
        .file("speech_file", "speech.wav", &wav_fixture(2.0, 0.3))
        .file("music_file", "music.wav", &wav_fixture(1.0, 0.2))
        .text("output_format", "wav")
        .finish();
    let response = app
        .post("/overlay?music_continue_after_speech=2&fade_in_duration=0", body, &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(wav_frames(&body_bytes(response).await), 4 * RATE);

    // В форме 1, в запросе 2, форма важнее
    let response = app
        .post("/overlay?music_continue_after_speech=2", standard_form().finish(), &[])
        .await;
    assert_eq!(wav_frames(&body_bytes(response).await), 3 * RATE);
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    let app = TestApp::new();
    let body = MultipartForm::default()
        .file("speech_file", "speech.flac", &wav_fixture(1.0, 0.3))
        .file("music_file", "music.wav", &wav_fixture(1.0, 0.2))
        .finish();
    let response = app.post("/overlay", body, &[]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.contains("speech.flac"), "{}", detail);
    assert_eq!(app.leftover_files(), 0);
}

#[tokio::test]
async fn test_corrupt_upload_is_client_error() {
    let app = TestApp::new();
    let body = MultipartForm::default()
        .file("speech_file", "speech.wav", &wav_fixture(1.0, 0.3))
        .file("music_file", "music.wav", b"definitely not a wav file")
        .finish();
    let response = app.post("/overlay", body, &[]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.contains("music"), "{}", detail);
    assert_eq!(app.leftover_files(), 0);
}

#[tokio::test]
async fn test_invalid_parameters_are_unprocessable() {
    let app = TestApp::new();

    let body = standard_form()
        .text("speech_start", "5")
        .text("speech_end", "2")
        .finish();
    let response = app.post("/overlay", body, &[]).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = standard_form().text("fade_in_duration", "-3").finish();
    let response = app.post("/overlay", body, &[]).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_missing_music_file() {
    let app = TestApp::new();
    let body = MultipartForm::default()
        .file("speech_file", "speech.wav", &wav_fixture(1.0, 0.3))
        .finish();
    let response = app.post("/overlay", body, &[]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.contains("music_file"), "{}", detail);
}

#[tokio::test]
async fn test_upload_over_limit() {
    let app = TestApp::with_config(|config| config.max_upload_bytes = 4 * 1024);
    let response = app.post("/overlay", standard_form().finish(), &[]).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_health_index_and_unknown_path() {
    let app = TestApp::new();

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("name=\"speech_file\""));
    assert!(html.contains("action=\"/overlay/\""));

    let response = app.get("/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_zero_speech_end_keeps_full_speech() {
    let app = TestApp::new();
    let body = standard_form()
        .text("speech_end", "0")
        .text("music_end", "0")
        .finish();
    let response = app.post("/overlay", body, &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    // как с пустыми концами: 2 с речи + 1 с хвоста
    assert_eq!(wav_frames(&body_bytes(response).await), 3 * RATE);
}
