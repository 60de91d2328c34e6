//! Библиотека audio-overlay: наложение речи на фоновую музыку
//!
//! Обрезка дорожек, усиление музыки, смещения, зацикливание короткой музыки,
//! хвост музыки после речи и затухания. Движок доступен как библиотека и
//! через HTTP-эндпоинт загрузки.

pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod server;
pub mod utils;

pub use config::ServerConfig;
pub use engine::{overlay, OverlayParams, ReconciliationStrategy};
pub use error::{OverlayError, Result, Track};
pub use media::{AudioBuffer, AudioCodec, InputFormat, OutputFormat, SymphoniaCodec};
pub use server::{router, start_server, AppState};
