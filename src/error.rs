//! Модуль обработки ошибок сервиса наложения
//!
//! Любой сбой запроса сводится к одному из вариантов ниже.
//! Запрос либо выполняется целиком, либо завершается ошибкой без повторов.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Дорожка, на которой обнаружена проблема
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    /// Речь
    Speech,
    /// Музыка
    Music,
    /// Готовый микс после кодирования
    Output,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Track::Speech => "speech",
            Track::Music => "music",
            Track::Output => "output",
        };
        f.write_str(name)
    }
}

/// Ошибки сервиса наложения
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Неподдерживаемый формат загрузки
    #[error("Invalid input format: {0}")]
    InvalidInputFormat(String),

    /// Аудио не декодируется или имеет нулевую длительность
    #[error("Empty or corrupt {track} audio: {reason}")]
    EmptyOrCorruptAudio { track: Track, reason: String },

    /// Сбой внутри конвейера обработки
    #[error("Audio engine failure: {0}")]
    EngineFailure(String),

    /// Недопустимое значение параметра
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Отсутствует обязательное поле формы
    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    /// Загрузка превышает лимит
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// Ошибка разбора multipart
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OverlayError {
    /// Ошибка пустого или повреждённого аудио
    pub fn corrupt(track: Track, reason: impl Into<String>) -> Self {
        OverlayError::EmptyOrCorruptAudio {
            track,
            reason: reason.into(),
        }
    }

    /// HTTP-статус ошибки
    ///
    /// Ошибки во входных данных клиента дают 4xx. Проблемы с результатом
    /// или внутри движка считаются ошибкой сервера.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OverlayError::InvalidInputFormat(_)
            | OverlayError::MissingField(_)
            | OverlayError::Multipart(_) => StatusCode::BAD_REQUEST,
            OverlayError::EmptyOrCorruptAudio { track, .. } => match track {
                Track::Output => StatusCode::INTERNAL_SERVER_ERROR,
                Track::Speech | Track::Music => StatusCode::BAD_REQUEST,
            },
            OverlayError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OverlayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            OverlayError::EngineFailure(_)
            | OverlayError::Io(_)
            | OverlayError::Json(_)
            | OverlayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OverlayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected: {}", self);
        }

        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<axum::extract::multipart::MultipartError> for OverlayError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            OverlayError::PayloadTooLarge(err.body_text())
        } else {
            OverlayError::Multipart(err.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for OverlayError {
    fn from(err: tokio::task::JoinError) -> Self {
        OverlayError::EngineFailure(format!("processing task did not complete: {}", err))
    }
}

/// Тип результата для библиотеки audio-overlay
pub type Result<T> = std::result::Result<T, OverlayError>;
