use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::{Multipart, Query, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::TryStreamExt;
use log::{debug, info};
use tokio::io::AsyncWriteExt;

use crate::engine::{self, OverlayParams};
use crate::error::{OverlayError, Result, Track};
use crate::media::{InputFormat, OutputFormat};
use crate::server::response::{OverlayOutput, ResponseEncoding};
use crate::server::AppState;
use crate::utils::RequestWorkspace;

const INDEX_HTML: &str = include_str!("index.html");

/// Отдает форму загрузки
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Проверка работоспособности
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Загрузка, сохранённая во временной директории запроса
#[derive(Debug)]
struct StoredUpload {
    /// Путь к сохранённому файлу
    path: PathBuf,
    /// Формат по расширению имени
    format: InputFormat,
    /// Размер в байтах
    size: usize,
}

/// `POST /overlay`: multipart с `speech_file`, `music_file` и параметрами.
/// Параметры можно передать и в строке запроса, поля формы важнее.
pub async fn overlay(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut workspace = RequestWorkspace::new(state.config.temp_dir.as_deref())?;

    let mut fields = query;
    let mut speech = None;
    let mut music = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let track = match name.as_str() {
            "speech_file" => Track::Speech,
            "music_file" => Track::Music,
            _ => {
                let value = field.text().await?;
                fields.insert(name, value);
                continue;
            }
        };

        // Пишем загрузку на диск частями
        let file_name = field.file_name().unwrap_or_default().to_string();
        let format = InputFormat::from_filename(&file_name)?;
        let path = workspace.file_path(&track.to_string(), format.extension());

        let mut file = tokio::fs::File::create(&path).await?;
        let mut size = 0;
        while let Some(chunk) = field.try_next().await? {
            size += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!("Stored {} upload '{}' ({} bytes)", track, file_name, size);
        let upload = Some(StoredUpload { path, format, size });
        match track {
            Track::Speech => speech = upload,
            _ => music = upload,
        }
    }

    let speech = speech.ok_or(OverlayError::MissingField("speech_file"))?;
    let music = music.ok_or(OverlayError::MissingField("music_file"))?;

    let params = OverlayParams::from_fields(&fields)?;
    let output_format = match fields.get("output_format").map(|v| v.trim()) {
        Some(value) if !value.is_empty() => value.parse::<OutputFormat>()?,
        _ => OutputFormat::default(),
    };
    let encoding = ResponseEncoding::negotiate(
        fields.get("response_format").map(String::as_str),
        &headers,
        &state.config.json_user_agents,
    )?;

    info!(
        "Overlay request: speech {} ({} bytes), music {} ({} bytes), output {}",
        speech.format,
        speech.size,
        music.format,
        music.size,
        output_format.extension()
    );
    debug!("Overlay parameters: {:?}", params);

    // Исходники больше не нужны на диске
    let speech_bytes = tokio::fs::read(&speech.path).await?;
    let music_bytes = tokio::fs::read(&music.path).await?;
    workspace.remove(&speech.path).await?;
    workspace.remove(&music.path).await?;

    // Тяжёлая работа уходит из async-рантайма
    let codec = state.codec.clone();
    let (speech_format, music_format) = (speech.format, music.format);
    let (encoded, duration_secs) = tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, f64)> {
        let speech = codec
            .decode(&speech_bytes, speech_format)
            .map_err(|e| OverlayError::corrupt(Track::Speech, e.to_string()))?;
        let music = codec
            .decode(&music_bytes, music_format)
            .map_err(|e| OverlayError::corrupt(Track::Music, e.to_string()))?;

        let mixed = engine::overlay(&speech, &music, &params);
        if mixed.is_empty() {
            return Err(OverlayError::corrupt(Track::Output, "mix has zero duration"));
        }

        let encoded = codec
            .encode(&mixed, output_format)
            .map_err(|e| OverlayError::corrupt(Track::Output, e.to_string()))?;
        Ok((encoded, mixed.duration_secs()))
    })
    .await??;

    let filename = format!(
        "combined_audio_{}.{}",
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        output_format.extension()
    );
    let output_path = workspace.named_path(&filename);
    tokio::fs::write(&output_path, &encoded).await?;
    let bytes = Bytes::from(tokio::fs::read(&output_path).await?);
    workspace.remove(&output_path).await?;

    if bytes.is_empty() {
        return Err(OverlayError::corrupt(Track::Output, "encoder produced no data"));
    }

    info!(
        "Created {} ({:.2}s, {} bytes, {:?})",
        filename,
        duration_secs,
        bytes.len(),
        encoding
    );

    let output = OverlayOutput {
        filename,
        format: output_format,
        bytes,
        duration_secs,
    };
    Ok(output.into_response(encoding))
}

/// Ответ для неизвестных путей
pub async fn not_found() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "detail": "Not Found" })),
    )
}
