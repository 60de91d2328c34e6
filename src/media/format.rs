//! Форматы загрузки и результата

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};

/// Поддерживаемые форматы загрузки
///
/// Проверяются по расширению имени файла до декодирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// MPEG Layer III
    Mp3,
    /// PCM в контейнере RIFF
    Wav,
    /// AAC в контейнере MP4
    M4a,
    /// Vorbis в контейнере Ogg
    Ogg,
}

impl InputFormat {
    /// Все поддерживаемые форматы
    pub const ALL: [InputFormat; 4] = [
        InputFormat::Mp3,
        InputFormat::Wav,
        InputFormat::M4a,
        InputFormat::Ogg,
    ];

    /// Расширение файла без точки
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
        }
    }

    /// Формат по расширению, без учёта регистра
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Проверяет имя загруженного файла, например `"Interview.MP3"`
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        Self::from_extension(ext).ok_or_else(|| {
            OverlayError::InvalidInputFormat(format!(
                "'{}' is not a supported audio file (expected one of: mp3, wav, m4a, ogg)",
                name
            ))
        })
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Форматы результата
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MP3 через LAME
    #[default]
    Mp3,
    /// 16-битный PCM WAV
    Wav,
}

impl OutputFormat {
    /// Расширение файла без точки
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    /// MIME-тип для заголовка Content-Type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            other => Err(OverlayError::InvalidParameter(format!(
                "output_format must be mp3 or wav, got '{}'",
                other
            ))),
        }
    }
}
