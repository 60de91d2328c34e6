//! # Движок наложения
//!
//! Чистая функция: два декодированных буфера и [`OverlayParams`] дают один
//! микс. Без ввода-вывода, часов и общего состояния, одинаковые входы
//! всегда дают одинаковые отсчёты.
//!
//! ## Этапы
//!
//! 0. Приведение входов к общему формату (большая частота, больше каналов)
//! 1. Обрезка речи и музыки по окнам `[start, end)`
//! 2. Усиление музыки (и при необходимости нормализация речи)
//! 3. Тишина `speech_overlay_start` секунд перед речью и
//!    `music_overlay_start` секунд перед музыкой
//! 4. Согласование длины музыки с речью (зацикливание или тишина)
//! 5. Наложение речи на музыкальную подложку
//! 6. До `music_continue_after_speech` секунд подложки после речи
//! 7. Обрезка до `len(речь с отступом) + продолжение`
//! 8. Нарастание и затухание
//!
//! ```
//! use audio_overlay::engine::{overlay, OverlayParams};
//! use audio_overlay::media::AudioBuffer;
//!
//! let speech = AudioBuffer::new(vec![0.5; 8000 * 4], 8000, 1);
//! let music = AudioBuffer::new(vec![0.1; 8000 * 20], 8000, 1);
//! let params = OverlayParams {
//!     music_continue_after_speech: 5,
//!     ..OverlayParams::default()
//! };
//!
//! let mixed = overlay(&speech, &music, &params);
//! assert_eq!(mixed.duration_ms(), 9_000);
//! ```

pub mod params;


use log::debug;

use crate::media::AudioBuffer;

pub use params::{secs_to_ms, OverlayParams, ReconciliationStrategy};

/// Запас по уровню при нормализации речи, дБ ниже полной шкалы
pub const NORMALIZE_HEADROOM_DB: f32 = 0.1;

/// Накладывает `speech` на `music` по параметрам `params`
///
/// Определена для любых входов: пустые или полностью обрезанные дорожки
/// дают тишину или микс без речи, а не ошибку.
pub fn overlay(speech: &AudioBuffer, music: &AudioBuffer, params: &OverlayParams) -> AudioBuffer {
    let sample_rate = speech.sample_rate().max(music.sample_rate());
    let channels = speech.channels().max(music.channels());
    let speech = speech.convert(sample_rate, channels);
    let music = music.convert(sample_rate, channels);

    let speech = speech.slice_ms(
        secs_to_ms(params.speech_start),
        params.speech_end.map(secs_to_ms),
    );
    let music = music.slice_ms(
        secs_to_ms(params.music_start),
        params.music_end.map(secs_to_ms),
    );
    debug!(
        "Trimmed inputs: speech {} ms, music {} ms ({} Hz, {} ch)",
        speech.duration_ms(),
        music.duration_ms(),
        sample_rate,
        channels
    );

    let speech = if params.normalize_speech {
        speech.normalize(NORMALIZE_HEADROOM_DB)
    } else {
        speech
    };
    let music = music.apply_gain(params.music_volume_adjustment_db as f32);

    let speech_lead = AudioBuffer::silent(secs_to_ms(params.speech_overlay_start), sample_rate, channels);
    let music_lead = AudioBuffer::silent(secs_to_ms(params.music_overlay_start), sample_rate, channels);

    let mixed_frames = speech_lead.frames() + speech.frames();
    let tail_frames = speech.ms_to_frames(secs_to_ms(params.music_continue_after_speech));

    // При зацикливании подложка покрывает и продолжение, хвост идёт по циклу
    let bed_frames = match params.reconciliation {
        ReconciliationStrategy::Loop => mixed_frames + tail_frames,
        ReconciliationStrategy::Silence => mixed_frames,
    };
    let music_frames = bed_frames.saturating_sub(music_lead.frames());
    let bed = music_lead.concat(&reconcile_music(&music, music_frames, params.reconciliation));
    debug!(
        "Music bed: {} frames for {} mixed + {} tail frames ({})",
        bed.frames(),
        mixed_frames,
        tail_frames,
        params.reconciliation
    );

    // Подложка под речью всегда полной длины
    let mixed = bed
        .slice_frames(0, mixed_frames)
        .pad_to_frames(mixed_frames)
        .overlay_at(&speech, speech_lead.frames());

    let tail = bed.slice_frames(mixed_frames, mixed_frames + tail_frames);
    if tail.frames() < tail_frames {
        debug!(
            "Music ran out after speech: {} of {} tail frames available",
            tail.frames(),
            tail_frames
        );
    }

    let combined = mixed
        .concat(&tail)
        .truncate_frames(mixed_frames + tail_frames);

    let result = combined
        .fade_in(secs_to_ms(params.fade_in_duration))
        .fade_out(secs_to_ms(params.fade_out_duration));

    debug!("Overlay finished: {} ms", result.duration_ms());
    result
}

/// Растягивает `music` минимум до `target_frames` кадров
///
/// Достаточно длинная музыка возвращается как есть. `Loop` повторяет её
/// с начала и обрезает ровно до `target_frames`, остаток (только для пустой
/// музыки) заполняется тишиной. `Silence` дополняет только тишиной.
pub fn reconcile_music(
    music: &AudioBuffer,
    target_frames: usize,
    strategy: ReconciliationStrategy,
) -> AudioBuffer {
    if music.frames() >= target_frames {
        return music.clone();
    }

    match strategy {
        ReconciliationStrategy::Loop => music
            .repeat_to_frames(target_frames)
            .pad_to_frames(target_frames),
        ReconciliationStrategy::Silence => music.pad_to_frames(target_frames),
    }
}
