//! Модуль конфигурации сервиса
//!
//! Сначала значения по умолчанию, затем необязательный JSON-файл из
//! `AUDIO_OVERLAY_CONFIG`, затем отдельные переменные окружения.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};

/// Переменная окружения с путём к файлу конфигурации
pub const CONFIG_FILE_ENV: &str = "AUDIO_OVERLAY_CONFIG";

/// Конфигурация HTTP-сервера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Адрес для прослушивания
    pub host: String,
    /// Порт
    pub port: u16,
    /// Корень временных директорий запросов (системная, если не задан)
    pub temp_dir: Option<PathBuf>,
    /// Максимальный размер multipart-запроса в байтах
    pub max_upload_bytes: usize,
    /// Таймаут обработки запроса в секундах
    pub request_timeout_secs: u64,
    /// Битрейт MP3 на выходе
    pub mp3_bitrate_kbps: u32,
    /// Фрагменты `User-Agent` клиентов, получающих JSON-ответ
    pub json_user_agents: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            temp_dir: None,
            max_upload_bytes: 100 * 1024 * 1024, // 100 MB
            request_timeout_secs: 300,
            mp3_bitrate_kbps: 192,
            json_user_agents: vec![
                "Make".to_string(),
                "Integromat".to_string(),
                "Zapier".to_string(),
                "n8n".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// Загружает конфигурацию из окружения процесса
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Загружает конфигурацию из JSON-файла
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OverlayError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Применяет переопределения из окружения, читая их через `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = parse_env("PORT", &port)?;
        }
        if let Some(host) = lookup("AUDIO_OVERLAY_HOST") {
            self.host = host;
        }
        if let Some(dir) = lookup("AUDIO_OVERLAY_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(mb) = lookup("AUDIO_OVERLAY_MAX_UPLOAD_MB") {
            let mb: usize = parse_env("AUDIO_OVERLAY_MAX_UPLOAD_MB", &mb)?;
            self.max_upload_bytes = mb * 1024 * 1024;
        }
        if let Some(secs) = lookup("AUDIO_OVERLAY_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("AUDIO_OVERLAY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(kbps) = lookup("AUDIO_OVERLAY_MP3_BITRATE") {
            self.mp3_bitrate_kbps = parse_env("AUDIO_OVERLAY_MP3_BITRATE", &kbps)?;
        }
        Ok(())
    }

    /// Адрес сокета для прослушивания
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            OverlayError::Configuration(format!(
                "invalid listen address {}:{}: {}",
                self.host, self.port, e
            ))
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| OverlayError::Configuration(format!("{} has invalid value '{}'", key, value)))
}
