//! # HTTP-сервер наложения
//!
//! | Путь | Описание |
//! |------|----------|
//! | `GET /` | Форма загрузки |
//! | `POST /overlay`, `POST /overlay/` | Наложение речи на музыку |
//! | `GET /health` | Проверка работоспособности |
//!
//! Обработчик только перекладывает байты. Декодирование, микширование и
//! кодирование выполняются в блокирующем пуле.

pub mod handlers;
pub mod response;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::media::{AudioCodec, SymphoniaCodec};

pub use response::{JsonEnvelope, OverlayOutput, ResponseEncoding};

/// Общее состояние обработчиков
#[derive(Clone)]
pub struct AppState {
    /// Кодек для чтения загрузок и записи результата
    pub codec: Arc<dyn AudioCodec>,
    /// Настройки сервера
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Создает состояние с кодеком по умолчанию
    pub fn new(config: ServerConfig) -> Self {
        let codec = SymphoniaCodec::with_mp3_bitrate(config.mp3_bitrate_kbps);
        Self::with_codec(config, Arc::new(codec))
    }

    /// Создает состояние с заданным кодеком
    pub fn with_codec(config: ServerConfig, codec: Arc<dyn AudioCodec>) -> Self {
        Self {
            codec,
            config: Arc::new(config),
        }
    }
}

/// Собирает маршрутизатор со всеми слоями
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/overlay", post(handlers::overlay))
        .route("/overlay/", post(handlers::overlay))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Логирует метод, путь, статус и время ответа
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} -> {} in {} ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Слушает `config.socket_addr()` до получения Ctrl-C
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let addr = config.socket_addr()?;
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Без сигнала сервер просто работает дальше
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
