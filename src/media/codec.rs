//! # Аудиокодек
//!
//! Декодирование загрузок в [`AudioBuffer`] и кодирование готового микса.
//! Движок работает только с отсчётами, байты обрабатываются здесь.
//!
//! - WAV читается через `hound` (целые 8/16/24/32 бит и float 32 бит)
//! - MP3, M4A (AAC) и OGG (Vorbis) декодируются через `symphonia`
//! - MP3 кодируется LAME через `mp3lame-encoder`, WAV пишется `hound`

use std::io::{Cursor, ErrorKind};

use dasp::Sample;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::media::buffer::AudioBuffer;
use crate::media::format::{InputFormat, OutputFormat};

/// Максимальная частота дискретизации для LAME
const MP3_MAX_SAMPLE_RATE: u32 = 48_000;

/// Битрейты LAME в кбит/с
pub const MP3_BITRATES: [u32; 16] = [
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// Ошибки кодека
#[derive(Debug, Error)]
pub enum CodecError {
    /// Контейнер не распознан
    #[error("unrecognised container: {0}")]
    UnknownContainer(String),

    /// В контейнере нет аудиодорожки
    #[error("no audio track found")]
    NoTrack,

    /// Ошибка декодирования
    #[error("decode failed: {0}")]
    Decode(String),

    /// Ошибка чтения или записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Неподдерживаемый формат отсчётов WAV
    #[error("unsupported WAV layout: {0:?}, {1} bit")]
    UnsupportedWav(SampleFormat, u16),

    /// Аудио нулевой длительности
    #[error("decoded audio has zero duration")]
    Empty,

    /// Ошибка кодировщика LAME
    #[error("MP3 encoder error: {0}")]
    Mp3(String),
}

/// Декодирование и кодирование аудио для сервера
pub trait AudioCodec: Send + Sync {
    /// Декодирует байты загрузки в буфер
    fn decode(&self, data: &[u8], format: InputFormat) -> Result<AudioBuffer, CodecError>;

    /// Кодирует буфер в формат результата
    fn encode(&self, buffer: &AudioBuffer, format: OutputFormat) -> Result<Vec<u8>, CodecError>;
}

/// Кодек по умолчанию на symphonia, hound и LAME
#[derive(Debug, Clone)]
pub struct SymphoniaCodec {
    /// Битрейт MP3 в кбит/с
    mp3_bitrate_kbps: u32,
}

impl Default for SymphoniaCodec {
    fn default() -> Self {
        Self {
            mp3_bitrate_kbps: 192,
        }
    }
}

impl SymphoniaCodec {
    /// Создает кодек с заданным битрейтом MP3
    ///
    /// Неподдерживаемый битрейт заменяется ближайшим поддерживаемым.
    pub fn with_mp3_bitrate(kbps: u32) -> Self {
        let nearest = MP3_BITRATES
            .iter()
            .copied()
            .min_by_key(|b| b.abs_diff(kbps))
            .unwrap_or(192);
        if nearest != kbps {
            warn!("MP3 bitrate {} kbps not supported, using {} kbps", kbps, nearest);
        }

        Self {
            mp3_bitrate_kbps: nearest,
        }
    }

    /// Битрейт MP3 в кбит/с
    pub fn mp3_bitrate_kbps(&self) -> u32 {
        self.mp3_bitrate_kbps
    }
}

impl AudioCodec for SymphoniaCodec {
    fn decode(&self, data: &[u8], format: InputFormat) -> Result<AudioBuffer, CodecError> {
        let buffer = match format {
            InputFormat::Wav => decode_wav(data)?,
            InputFormat::Mp3 | InputFormat::M4a | InputFormat::Ogg => {
                decode_with_symphonia(data, format)?
            }
        };

        if buffer.is_empty() {
            return Err(CodecError::Empty);
        }

        info!(
            "Decoded {} audio: {} frames, {} Hz, {} channel(s), {:.2}s",
            format,
            buffer.frames(),
            buffer.sample_rate(),
            buffer.channels(),
            buffer.duration_secs()
        );
        Ok(buffer)
    }

    fn encode(&self, buffer: &AudioBuffer, format: OutputFormat) -> Result<Vec<u8>, CodecError> {
        let bytes = match format {
            OutputFormat::Mp3 => encode_mp3(buffer, self.mp3_bitrate_kbps)?,
            OutputFormat::Wav => encode_wav(buffer)?,
        };

        info!(
            "Encoded {:.2}s of audio to {} ({} bytes)",
            buffer.duration_secs(),
            format.extension(),
            bytes.len()
        );
        Ok(bytes)
    }
}

/// Читает WAV из памяти, отсчёты остаются чередующимися
pub fn decode_wav(data: &[u8]) -> Result<AudioBuffer, CodecError> {
    let mut reader = WavReader::new(Cursor::new(data))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => read_wav_samples(&mut reader, |s: i8| s.to_sample::<f32>())?,
        (SampleFormat::Int, 16) => read_wav_samples(&mut reader, |s: i16| s.to_sample::<f32>())?,
        // 24-битные значения лежат в младших битах i32
        (SampleFormat::Int, 24) => {
            read_wav_samples(&mut reader, |s: i32| (s << 8).to_sample::<f32>())?
        }
        (SampleFormat::Int, 32) => read_wav_samples(&mut reader, |s: i32| s.to_sample::<f32>())?,
        (SampleFormat::Float, 32) => read_wav_samples(&mut reader, |s: f32| s)?,
        (format, bits) => return Err(CodecError::UnsupportedWav(format, bits)),
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Читает все отсчёты WAV с преобразованием в f32
fn read_wav_samples<S, R, F>(reader: &mut WavReader<R>, convert: F) -> Result<Vec<f32>, CodecError>
where
    S: hound::Sample,
    R: std::io::Read,
    F: Fn(S) -> f32,
{
    reader
        .samples::<S>()
        .map(|s| s.map(&convert).map_err(CodecError::from))
        .collect()
}

/// Декодирует любой известный symphonia контейнер, расширение служит подсказкой
fn decode_with_symphonia(data: &[u8], format: InputFormat) -> Result<AudioBuffer, CodecError> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| CodecError::UnknownContainer(e.to_string()))?;

    let mut reader = detected.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(CodecError::NoTrack)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CodecError::Decode(e.to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut samples: Vec<f32> = Vec::new();
    let mut skipped = 0usize;

    // Повреждённые пакеты пропускаем, конец потока приходит как EOF
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(CodecError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate.is_none() {
                    sample_rate = Some(spec.rate);
                }
                if channels.is_none() {
                    channels = Some(spec.channels.count() as u16);
                }

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(sample_buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                skipped += 1;
            }
            Err(SymphoniaError::IoError(_)) => {
                skipped += 1;
            }
            Err(e) => return Err(CodecError::Decode(e.to_string())),
        }
    }

    if skipped > 0 {
        warn!("Skipped {} corrupt {} packet(s)", skipped, format);
    }

    let sample_rate = sample_rate.ok_or_else(|| CodecError::Decode("unknown sample rate".into()))?;
    let channels = channels.ok_or_else(|| CodecError::Decode("unknown channel layout".into()))?;
    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Битрейт LAME по значению в кбит/с
fn mp3_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        _ => Bitrate::Kbps192,
    }
}

/// Кодирует буфер в MP3
///
/// LAME принимает моно или стерео до 48 кГц, остальное сначала
/// конвертируется. Отсчёты ограничиваются полной шкалой, другой защиты
/// от клиппинга у микса нет.
pub fn encode_mp3(buffer: &AudioBuffer, bitrate_kbps: u32) -> Result<Vec<u8>, CodecError> {
    let channels = buffer.channels().min(2);
    let sample_rate = buffer.sample_rate().min(MP3_MAX_SAMPLE_RATE);
    let buffer = buffer.convert(sample_rate, channels);
    let samples: Vec<f32> = buffer.samples().iter().map(|s| s.clamp(-1.0, 1.0)).collect();

    let lame_err = |e: &dyn std::fmt::Debug| CodecError::Mp3(format!("{:?}", e));

    let mut builder =
        Builder::new().ok_or_else(|| CodecError::Mp3("failed to allocate LAME".into()))?;
    builder.set_num_channels(channels as u8).map_err(|e| lame_err(&e))?;
    builder.set_sample_rate(sample_rate).map_err(|e| lame_err(&e))?;
    builder.set_brate(mp3_bitrate(bitrate_kbps)).map_err(|e| lame_err(&e))?;
    builder.set_quality(Quality::Best).map_err(|e| lame_err(&e))?;
    let mut encoder = builder.build().map_err(|e| lame_err(&e))?;

    // Рекомендация LAME: 1.25 * num_samples + 7200 байт
    let estimated_size = (buffer.frames() as f64 * 1.25 + 7200.0) as usize;
    let mut mp3_buffer: Vec<u8> = Vec::with_capacity(estimated_size);

    let encoded = if channels == 1 {
        encoder.encode(MonoPcm(&samples), mp3_buffer.spare_capacity_mut())
    } else {
        encoder.encode(InterleavedPcm(&samples), mp3_buffer.spare_capacity_mut())
    };
    let written = encoded.map_err(|e| lame_err(&e))?;
    // SAFETY: LAME записал ровно `written` байт
    unsafe {
        mp3_buffer.set_len(written);
    }

    mp3_buffer.reserve(7200);
    let flushed = encoder
        .flush::<FlushNoGap>(mp3_buffer.spare_capacity_mut())
        .map_err(|e| lame_err(&e))?;
    // SAFETY: тот же контракт для сброшенного хвоста
    unsafe {
        mp3_buffer.set_len(mp3_buffer.len() + flushed);
    }

    Ok(mp3_buffer)
}

/// Кодирует буфер в 16-битный PCM WAV
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, CodecError> {
    let spec = WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in buffer.samples() {
            writer.write_sample(sample.clamp(-1.0, 1.0).to_sample::<i16>())?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
