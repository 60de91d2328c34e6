//! Модуль выдачи готового микса
//!
//! Браузер и curl получают аудио напрямую. Платформы автоматизации
//! (Make, Zapier, n8n) плохо работают с бинарным телом и получают те же
//! байты в base64 внутри JSON.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;

use crate::error::{OverlayError, Result};
use crate::media::OutputFormat;

/// Способ отдачи результата
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEncoding {
    /// Аудио в теле ответа
    Binary,
    /// Аудио в base64 внутри JSON
    Json,
}

impl ResponseEncoding {
    /// Выбирает способ отдачи для запроса
    ///
    /// Явный `response_format` важнее всего. Иначе JSON выбирается, если
    /// `Accept` просит `application/json` без аудио-типа, либо если
    /// `User-Agent` содержит одну из строк `json_user_agents`.
    pub fn negotiate(
        requested: Option<&str>,
        headers: &HeaderMap,
        json_user_agents: &[String],
    ) -> Result<Self> {
        if let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) {
            return match requested.to_ascii_lowercase().as_str() {
                "binary" | "file" | "audio" => Ok(Self::Binary),
                "json" => Ok(Self::Json),
                other => Err(OverlayError::InvalidParameter(format!(
                    "response_format must be binary or json, got '{}'",
                    other
                ))),
            };
        }

        let accept = header_str(headers, header::ACCEPT).to_ascii_lowercase();
        if accept.contains("application/json") && !accept.contains("audio/") {
            return Ok(Self::Json);
        }

        let user_agent = header_str(headers, header::USER_AGENT);
        if json_user_agents
            .iter()
            .any(|marker| !marker.is_empty() && user_agent.contains(marker.as_str()))
        {
            log::debug!("Using JSON envelope for user agent '{}'", user_agent);
            return Ok(Self::Json);
        }

        Ok(Self::Binary)
    }
}

/// Значение заголовка или пустая строка
fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// JSON-представление готового микса
#[derive(Debug, Serialize)]
pub struct JsonEnvelope {
    /// Имя файла результата
    pub filename: String,
    /// MIME-тип аудио
    pub content_type: &'static str,
    /// Размер аудио в байтах
    pub size_bytes: usize,
    /// Длительность, округлённая до миллисекунд
    pub duration_seconds: f64,
    /// `data:<mime>;base64,<payload>`
    pub data: String,
}

/// Закодированный микс, готовый к отправке
#[derive(Debug)]
pub struct OverlayOutput {
    /// Имя файла результата
    pub filename: String,
    /// Формат кодирования
    pub format: OutputFormat,
    /// Закодированные байты
    pub bytes: Bytes,
    /// Длительность в секундах
    pub duration_secs: f64,
}

impl OverlayOutput {
    /// Упаковывает байты в JSON-конверт
    pub fn into_envelope(self) -> JsonEnvelope {
        let content_type = self.format.mime_type();
        JsonEnvelope {
            size_bytes: self.bytes.len(),
            data: format!("data:{};base64,{}", content_type, BASE64.encode(&self.bytes)),
            filename: self.filename,
            content_type,
            duration_seconds: (self.duration_secs * 1000.0).round() / 1000.0,
        }
    }

    /// Формирует HTTP-ответ в выбранном виде
    pub fn into_response(self, encoding: ResponseEncoding) -> Response {
        match encoding {
            ResponseEncoding::Json => Json(self.into_envelope()).into_response(),
            ResponseEncoding::Binary => {
                let disposition = format!("attachment; filename=\"{}\"", self.filename);
                let mut response = self.bytes.into_response();
                let headers = response.headers_mut();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(self.format.mime_type()),
                );
                if let Ok(value) = HeaderValue::from_str(&disposition) {
                    headers.insert(header::CONTENT_DISPOSITION, value);
                }
                response
            }
        }
    }
}
