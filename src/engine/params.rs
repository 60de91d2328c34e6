//! Модуль параметров наложения
//!
//! Все длительности задаются в целых секундах. Параметры разбираются и
//! проверяются один раз на входе HTTP, дальше движок им доверяет.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};

/// Верхняя граница любой длительности (3 часа)
pub const MAX_SECONDS: u32 = 3 * 60 * 60;

/// Способ растянуть музыку, если она короче речи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStrategy {
    /// Повторять музыку с начала, остаток дополнить тишиной
    #[default]
    Loop,
    /// Дополнить музыку только тишиной
    Silence,
}

impl fmt::Display for ReconciliationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loop => f.write_str("loop"),
            Self::Silence => f.write_str("silence"),
        }
    }
}

impl FromStr for ReconciliationStrategy {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loop" => Ok(Self::Loop),
            "silence" | "pad" => Ok(Self::Silence),
            other => Err(OverlayError::InvalidParameter(format!(
                "reconciliation must be 'loop' or 'silence', got '{}'",
                other
            ))),
        }
    }
}

/// Параметры наложения речи на музыку
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayParams {
    /// Усиление музыки в дБ
    pub music_volume_adjustment_db: i32,
    /// Начало речи
    pub speech_start: u32,
    /// Конец речи, `None` означает до конца файла
    pub speech_end: Option<u32>,
    /// Начало музыки
    pub music_start: u32,
    /// Конец музыки, `None` означает до конца файла
    pub music_end: Option<u32>,
    /// Тишина перед речью
    pub speech_overlay_start: u32,
    /// Тишина перед музыкой
    pub music_overlay_start: u32,
    /// Сколько музыки звучит после окончания речи
    pub music_continue_after_speech: u32,
    /// Длительность нарастания
    pub fade_in_duration: u32,
    /// Длительность затухания
    pub fade_out_duration: u32,
    /// Нормализовать речь по пику перед наложением
    pub normalize_speech: bool,
    /// Способ растянуть короткую музыку
    pub reconciliation: ReconciliationStrategy,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self {
            music_volume_adjustment_db: -10,
            speech_start: 0,
            speech_end: None,
            music_start: 0,
            music_end: None,
            speech_overlay_start: 0,
            music_overlay_start: 0,
            music_continue_after_speech: 0,
            fade_in_duration: 0,
            fade_out_duration: 0,
            normalize_speech: false,
            reconciliation: ReconciliationStrategy::default(),
        }
    }
}

/// Переводит секунды в миллисекунды
#[inline]
pub fn secs_to_ms(secs: u32) -> u64 {
    secs as u64 * 1000
}

impl OverlayParams {
    /// Значения формы загрузки: пять секунд музыки после речи и
    /// трёхсекундные нарастание и затухание
    pub fn form_defaults() -> Self {
        Self {
            music_continue_after_speech: 5,
            fade_in_duration: 3,
            fade_out_duration: 3,
            ..Self::default()
        }
    }

    /// Собирает параметры из строковых полей формы или запроса
    ///
    /// Имена полей сравниваются без учёта регистра, неизвестные поля
    /// игнорируются, пустые значения оставляют значение по умолчанию.
    /// Конец, равный `0`, означает "до конца дорожки".
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let mut params = Self::form_defaults();

        for (raw_name, raw_value) in fields {
            let name = raw_name.trim().to_ascii_lowercase();
            let value = raw_value.trim();
            if value.is_empty() {
                continue;
            }

            match name.as_str() {
                "music_volume_adjustment" | "music_volume_adjustment_db" => {
                    params.music_volume_adjustment_db = value.parse().map_err(|_| {
                        OverlayError::InvalidParameter(format!(
                            "{} must be a whole number of dB, got '{}'",
                            name, value
                        ))
                    })?;
                }
                "speech_start" => params.speech_start = parse_seconds(&name, value)?,
                "speech_end" => params.speech_end = parse_end(&name, value)?,
                "music_start" => params.music_start = parse_seconds(&name, value)?,
                "music_end" => params.music_end = parse_end(&name, value)?,
                "speech_overlay_start" => params.speech_overlay_start = parse_seconds(&name, value)?,
                "music_overlay_start" => params.music_overlay_start = parse_seconds(&name, value)?,
                "music_continue_after_speech" => {
                    params.music_continue_after_speech = parse_seconds(&name, value)?
                }
                "fade_in_duration" => params.fade_in_duration = parse_seconds(&name, value)?,
                "fade_out_duration" => params.fade_out_duration = parse_seconds(&name, value)?,
                "normalize_speech" => params.normalize_speech = parse_flag(&name, value)?,
                "reconciliation" | "reconciliation_strategy" => {
                    params.reconciliation = value.parse()?
                }
                _ => {}
            }
        }

        params.validate()?;
        Ok(params)
    }

    /// Проверяет ограничения между полями
    pub fn validate(&self) -> Result<()> {
        check_range("speech", self.speech_start, self.speech_end)?;
        check_range("music", self.music_start, self.music_end)?;

        for (name, value) in [
            ("speech_start", self.speech_start),
            ("music_start", self.music_start),
            ("speech_overlay_start", self.speech_overlay_start),
            ("music_overlay_start", self.music_overlay_start),
            ("music_continue_after_speech", self.music_continue_after_speech),
            ("fade_in_duration", self.fade_in_duration),
            ("fade_out_duration", self.fade_out_duration),
        ] {
            check_limit(name, value)?;
        }
        if let Some(end) = self.speech_end {
            check_limit("speech_end", end)?;
        }
        if let Some(end) = self.music_end {
            check_limit("music_end", end)?;
        }

        if self.music_volume_adjustment_db.unsigned_abs() > 120 {
            return Err(OverlayError::InvalidParameter(format!(
                "music_volume_adjustment must be within ±120 dB, got {}",
                self.music_volume_adjustment_db
            )));
        }

        Ok(())
    }
}

/// Целое неотрицательное число секунд
fn parse_seconds(name: &str, value: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|_| {
        OverlayError::InvalidParameter(format!(
            "{} must be a non-negative whole number of seconds, got '{}'",
            name, value
        ))
    })
}

/// Форма шлёт `0` для незаполненного конца: это "до конца файла".
fn parse_end(name: &str, value: &str) -> Result<Option<u32>> {
    let secs = parse_seconds(name, value)?;
    Ok((secs > 0).then_some(secs))
}

/// Логический флаг в форме `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`
fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(OverlayError::InvalidParameter(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}

/// Конец окна не раньше начала
fn check_range(track: &str, start: u32, end: Option<u32>) -> Result<()> {
    match end {
        Some(end) if end < start => Err(OverlayError::InvalidParameter(format!(
            "{track}_end ({end}) must not be before {track}_start ({start})"
        ))),
        _ => Ok(()),
    }
}

fn check_limit(name: &str, value: u32) -> Result<()> {
    if value > MAX_SECONDS {
        return Err(OverlayError::InvalidParameter(format!(
            "{} must be at most {} seconds, got {}",
            name, MAX_SECONDS, value
        )));
    }
    Ok(())
}
