//! # PCM-буфер
//!
//! `AudioBuffer` хранит чередующиеся отсчёты `f32` (номинально [-1.0, 1.0])
//! вместе с частотой дискретизации и числом каналов. Позиции задаются
//! в кадрах или в миллисекундах.
//!
//! Все операции заимствуют `self` и возвращают новый буфер, исходный
//! буфер не изменяется.

use dasp::interpolate::linear::Linear;
use dasp::{signal, Signal};

/// Амплитуда, ниже которой сигнал считается тишиной
const SILENCE_FLOOR: f32 = 0.000_01;

/// Переводит усиление в дБ в линейный множитель
///
/// ```
/// use audio_overlay::media::buffer::db_to_amplitude;
/// assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-6);
/// ```
#[inline]
pub fn db_to_amplitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Среднеквадратичное значение отсчётов (0.0 для пустого среза)
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Аудиобуфер в памяти
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Чередующиеся отсчёты
    samples: Vec<f32>,
    /// Частота дискретизации
    sample_rate: u32,
    /// Количество каналов
    channels: u16,
}

impl AudioBuffer {
    /// Оборачивает чередующиеся отсчёты, неполный последний кадр отбрасывается
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);

        Self {
            samples,
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    /// Тишина длительностью `duration_ms`
    pub fn silent(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let empty = Self::new(Vec::new(), sample_rate, channels);
        let frames = empty.ms_to_frames(duration_ms);
        empty.pad_to_frames(frames)
    }

    /// Пустой буфер в том же формате
    pub fn empty_like(&self) -> Self {
        Self::new(Vec::new(), self.sample_rate, self.channels)
    }

    /// Отсчёты буфера
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Количество кадров
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Совпадают ли частота и число каналов
    pub fn same_format(&self, other: &AudioBuffer) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Длительность в миллисекундах с округлением
    pub fn duration_ms(&self) -> u64 {
        let rate = self.sample_rate as u64;
        (self.frames() as u64 * 1000 + rate / 2) / rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Индекс кадра для `ms` миллисекунд (с округлением вниз)
    pub fn ms_to_frames(&self, ms: u64) -> usize {
        (ms * self.sample_rate as u64 / 1000) as usize
    }

    /// Кадры `[start, end)` в пределах буфера
    ///
    /// При `end < start` получается пустой буфер.
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let end = end.min(self.frames());
        let start = start.min(end);
        let ch = self.channels as usize;

        Self::new(
            self.samples[start * ch..end * ch].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Миллисекунды `[start_ms, end_ms)`, `None` означает до конца буфера
    pub fn slice_ms(&self, start_ms: u64, end_ms: Option<u64>) -> AudioBuffer {
        let start = self.ms_to_frames(start_ms);
        let end = match end_ms {
            Some(ms) => self.ms_to_frames(ms),
            None => self.frames(),
        };
        self.slice_frames(start, end)
    }

    /// Склеивает `self` и `other`
    ///
    /// `other` сначала приводится к формату `self`.
    pub fn concat(&self, other: &AudioBuffer) -> AudioBuffer {
        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len());
        samples.extend_from_slice(&self.samples);
        if self.same_format(other) {
            samples.extend_from_slice(&other.samples);
        } else {
            let converted = other.convert(self.sample_rate, self.channels);
            samples.extend_from_slice(&converted.samples);
        }

        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Зацикливает буфер с начала и обрезает ровно до `frames`
    ///
    /// Пустой буфер остаётся пустым.
    pub fn repeat_to_frames(&self, frames: usize) -> AudioBuffer {
        if self.is_empty() {
            return self.clone();
        }

        let total = frames * self.channels as usize;
        let samples: Vec<f32> = self.samples.iter().copied().cycle().take(total).collect();
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Дополняет тишиной до `frames` кадров, более длинный буфер не меняется
    pub fn pad_to_frames(&self, frames: usize) -> AudioBuffer {
        let mut samples = self.samples.clone();
        let total = frames * self.channels as usize;
        if samples.len() < total {
            samples.resize(total, 0.0);
        }
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Обрезает до `frames` кадров
    pub fn truncate_frames(&self, frames: usize) -> AudioBuffer {
        self.slice_frames(0, frames)
    }

    /// Накладывает `other` на копию `self` с кадра `position`
    ///
    /// Длина результата равна длине `self`, выходящая за конец часть
    /// `other` отбрасывается. Амплитуды складываются.
    pub fn overlay_at(&self, other: &AudioBuffer, position: usize) -> AudioBuffer {
        let converted;
        let other = if self.same_format(other) {
            other
        } else {
            converted = other.convert(self.sample_rate, self.channels);
            &converted
        };

        let ch = self.channels as usize;
        let mut samples = self.samples.clone();
        let start = (position * ch).min(samples.len());
        for (dst, src) in samples[start..].iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }

        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Умножает отсчёты на `10^(db/20)` без ограничения
    pub fn apply_gain(&self, db: f32) -> AudioBuffer {
        if db == 0.0 {
            return self.clone();
        }

        let factor = db_to_amplitude(db);
        let samples = self.samples.iter().map(|&s| s * factor).collect();
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Линейное нарастание из тишины за первые `duration_ms`
    /// (не длиннее буфера)
    pub fn fade_in(&self, duration_ms: u64) -> AudioBuffer {
        let fade = self.ms_to_frames(duration_ms).min(self.frames());
        let mut out = self.clone();
        if fade == 0 {
            return out;
        }

        let ch = self.channels as usize;
        for (frame, chunk) in out.samples.chunks_mut(ch).take(fade).enumerate() {
            let factor = frame as f32 / fade as f32;
            chunk.iter_mut().for_each(|s| *s *= factor);
        }
        out
    }

    /// Линейное затухание в тишину за последние `duration_ms`
    /// (не длиннее буфера)
    pub fn fade_out(&self, duration_ms: u64) -> AudioBuffer {
        let fade = self.ms_to_frames(duration_ms).min(self.frames());
        let mut out = self.clone();
        if fade == 0 {
            return out;
        }

        let ch = self.channels as usize;
        let first = self.frames() - fade;
        for (i, chunk) in out.samples.chunks_mut(ch).skip(first).enumerate() {
            let factor = (fade - i - 1) as f32 / fade as f32;
            chunk.iter_mut().for_each(|s| *s *= factor);
        }
        out
    }

    /// Максимальная абсолютная амплитуда
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()))
    }

    /// Среднеквадратичное значение буфера
    pub fn rms(&self) -> f32 {
        compute_rms(&self.samples)
    }

    /// Нормализует по пику на `headroom_db` ниже полной шкалы
    ///
    /// Тишина возвращается без изменений.
    pub fn normalize(&self, headroom_db: f32) -> AudioBuffer {
        let peak = self.peak();
        if peak <= SILENCE_FLOOR {
            log::warn!("Skipping normalization of silent buffer (peak {:.6})", peak);
            return self.clone();
        }

        let target = db_to_amplitude(-headroom_db);
        let factor = target / peak;
        log::debug!(
            "Peak normalization: peak={:.6}, target={:.6}, factor={:.6}",
            peak,
            target,
            factor
        );

        let samples = self.samples.iter().map(|&s| s * factor).collect();
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Конвертирует частоту дискретизации и число каналов
    ///
    /// Сначала пересводятся каналы: лишние усредняются, недостающие
    /// повторяют имеющиеся. Частота меняется линейной интерполяцией.
    pub fn convert(&self, sample_rate: u32, channels: u16) -> AudioBuffer {
        let sample_rate = sample_rate.max(1);
        let channels = channels.max(1);
        if self.sample_rate == sample_rate && self.channels == channels {
            return self.clone();
        }

        let remixed = self.remix_channels(channels);
        if remixed.sample_rate == sample_rate {
            return remixed;
        }

        let ch = channels as usize;
        let in_frames = remixed.frames();
        let out_frames =
            (in_frames as u64 * sample_rate as u64 / remixed.sample_rate as u64) as usize;

        let mut samples = vec![0.0f32; out_frames * ch];
        for c in 0..ch {
            let channel: Vec<f32> = remixed.samples.iter().skip(c).step_by(ch).copied().collect();
            let converted = resample_linear(&channel, remixed.sample_rate, sample_rate, out_frames);
            for (frame, value) in converted.into_iter().enumerate() {
                samples[frame * ch + c] = value;
            }
        }

        Self::new(samples, sample_rate, channels)
    }

    /// Пересведение каналов без смены частоты
    fn remix_channels(&self, channels: u16) -> AudioBuffer {
        if self.channels == channels {
            return self.clone();
        }

        let in_ch = self.channels as usize;
        let out_ch = channels as usize;
        let mut samples = Vec::with_capacity(self.frames() * out_ch);

        for frame in self.samples.chunks(in_ch) {
            for k in 0..out_ch {
                if out_ch < in_ch {
                    let (sum, count) = frame
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| j % out_ch == k)
                        .fold((0.0f32, 0usize), |(sum, n), (_, &s)| (sum + s, n + 1));
                    samples.push(sum / count.max(1) as f32);
                } else {
                    samples.push(frame[k % in_ch]);
                }
            }
        }

        Self::new(samples, self.sample_rate, channels)
    }
}

/// Смена частоты одного канала линейным интерполятором
fn resample_linear(channel: &[f32], from_hz: u32, to_hz: u32, out_frames: usize) -> Vec<f32> {
    if channel.is_empty() || out_frames == 0 {
        return vec![0.0; out_frames];
    }

    // Держим последний отсчёт, иначе хвост интерполируется к нулю
    let last = channel[channel.len() - 1];
    let held = channel.iter().copied().chain(std::iter::repeat(last));
    let mut source = signal::from_iter(held.map(|s| [s]));
    let first = source.next();
    let second = source.next();
    let interp = Linear::new(first, second);

    source
        .from_hz_to_hz(interp, from_hz as f64, to_hz as f64)
        .take(out_frames)
        .map(|frame| frame[0])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32, channels: u16) -> AudioBuffer {
        let samples = (0..frames * channels as usize)
            .map(|i| (i / channels as usize) as f32 / frames as f32)
            .collect();
        AudioBuffer::new(samples, sample_rate, channels)
    }

    #[test]
    fn test_duration_calculation() {
        let buf = AudioBuffer::new(vec![0.0; 88_200], 44_100, 2);
        assert_eq!(buf.frames(), 44_100);
        assert_eq!(buf.duration_ms(), 1000);
        assert_eq!(buf.duration_secs(), 1.0);
        assert_eq!(AudioBuffer::silent(0, 44_100, 1).duration_ms(), 0);
    }

    #[test]
    fn test_partial_frame_is_dropped() {
        let buf = AudioBuffer::new(vec![0.1, 0.2, 0.3], 1000, 2);
        assert_eq!(buf.samples(), &[0.1, 0.2]);
    }

    #[test]
    fn test_silent_has_requested_length() {
        let buf = AudioBuffer::silent(1500, 8000, 2);
        assert_eq!(buf.frames(), 12_000);
        assert!(buf.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_slice_ms_clamps_to_bounds() {
        let buf = ramp(1000, 1000, 1);
        assert_eq!(buf.slice_ms(200, Some(500)).frames(), 300);
        assert_eq!(buf.slice_ms(200, None).frames(), 800);
        assert_eq!(buf.slice_ms(900, Some(5000)).frames(), 100);
        assert_eq!(buf.slice_ms(5000, None).frames(), 0);
        assert_eq!(buf.slice_ms(600, Some(300)).frames(), 0);
        assert_eq!(buf.slice_ms(200, Some(500)).samples()[0], buf.samples()[200]);
    }

    #[test]
    fn test_concat_preserves_order() {
        let a = AudioBuffer::new(vec![1.0, 2.0], 1000, 1);
        let b = AudioBuffer::new(vec![3.0], 1000, 1);
        assert_eq!(a.concat(&b).samples(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_repeat_to_frames_loops_and_truncates() {
        let buf = AudioBuffer::new(vec![1.0, 2.0, 3.0], 1000, 1);
        assert_eq!(buf.repeat_to_frames(7).samples(), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert_eq!(buf.repeat_to_frames(2).samples(), &[1.0, 2.0]);
        assert!(buf.empty_like().repeat_to_frames(10).is_empty());
    }

    #[test]
    fn test_repeat_keeps_stereo_frames_aligned() {
        let buf = AudioBuffer::new(vec![0.1, -0.1, 0.2, -0.2], 1000, 2);
        let looped = buf.repeat_to_frames(3);
        assert_eq!(looped.samples(), &[0.1, -0.1, 0.2, -0.2, 0.1, -0.1]);
    }

    #[test]
    fn test_overlay_at_adds_within_base_length() {
        let base = AudioBuffer::new(vec![0.5; 5], 1000, 1);
        let top = AudioBuffer::new(vec![0.25; 4], 1000, 1);
        let mixed = base.overlay_at(&top, 3);
        assert_eq!(mixed.samples(), &[0.5, 0.5, 0.5, 0.75, 0.75]);
        // исходник не изменился
        assert_eq!(base.samples(), &[0.5; 5]);
    }

    #[test]
    fn test_overlay_past_end_is_noop() {
        let base = AudioBuffer::new(vec![0.5; 3], 1000, 1);
        let top = AudioBuffer::new(vec![0.25; 3], 1000, 1);
        assert_eq!(base.overlay_at(&top, 10), base);
    }

    #[test]
    fn test_apply_gain() {
        let buf = AudioBuffer::new(vec![0.5, -0.5], 1000, 1);
        let quieter = buf.apply_gain(-20.0);
        assert!((quieter.samples()[0] - 0.05).abs() < 1e-6);
        assert!((quieter.samples()[1] + 0.05).abs() < 1e-6);
        assert_eq!(buf.apply_gain(0.0), buf);
    }

    #[test]
    fn test_gain_does_not_clip() {
        let buf = AudioBuffer::new(vec![0.9], 1000, 1);
        assert!(buf.apply_gain(12.0).samples()[0] > 1.0);
    }

    #[test]
    fn test_fade_in_and_out() {
        let buf = AudioBuffer::new(vec![1.0; 1000], 1000, 1);

        let faded = buf.fade_in(100);
        assert_eq!(faded.samples()[0], 0.0);
        assert!((faded.samples()[50] - 0.5).abs() < 0.01);
        assert_eq!(faded.samples()[100], 1.0);

        let faded = buf.fade_out(100);
        assert_eq!(faded.samples()[899], 1.0);
        assert!((faded.samples()[950] - 0.5).abs() < 0.02);
        assert_eq!(faded.samples()[999], 0.0);
    }

    #[test]
    fn test_fade_longer_than_buffer_spans_whole_buffer() {
        let buf = AudioBuffer::new(vec![1.0; 10], 1000, 1);
        let faded = buf.fade_in(60_000);
        assert_eq!(faded.samples()[0], 0.0);
        assert!((faded.samples()[5] - 0.5).abs() < 1e-6);

        let faded = buf.fade_out(60_000);
        assert_eq!(faded.samples()[9], 0.0);
        assert!((faded.samples()[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_zero_fade_is_identity() {
        let buf = ramp(500, 1000, 2);
        assert_eq!(buf.fade_in(0), buf);
        assert_eq!(buf.fade_out(0), buf);
    }

    #[test]
    fn test_normalize_peak() {
        let buf = AudioBuffer::new(vec![-0.3, 0.1, 0.5, -0.4, 0.2], 1000, 1);
        let normalized = buf.normalize(0.0);
        assert!((normalized.peak() - 1.0).abs() < 1e-6);
        assert!((normalized.samples()[2] / normalized.samples()[1] - 5.0).abs() < 1e-4);

        let silent = AudioBuffer::silent(10, 1000, 1);
        assert_eq!(silent.normalize(0.1), silent);
    }

    #[test]
    fn test_compute_rms() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        assert!((compute_rms(&samples) - 0.7071).abs() < 0.0001);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn test_convert_channels() {
        let stereo = AudioBuffer::new(vec![0.2, 0.4, -0.2, -0.4], 1000, 2);
        let mono = stereo.convert(1000, 1);
        assert_eq!(mono.channels(), 1);
        assert!((mono.samples()[0] - 0.3).abs() < 1e-6);
        assert!((mono.samples()[1] + 0.3).abs() < 1e-6);

        let back = mono.convert(1000, 2);
        assert_eq!(back.frames(), 2);
        assert_eq!(back.samples()[0], back.samples()[1]);
    }

    #[test]
    fn test_upsampling_holds_last_sample() {
        let buf = AudioBuffer::new(vec![0.7; 2_205], 22_050, 1);
        let up = buf.convert(44_100, 1);
        assert_eq!(up.frames(), 4_410);
        for (i, &s) in up.samples().iter().enumerate() {
            assert!((s - 0.7).abs() < 1e-6, "frame {}: {}", i, s);
        }
    }

    #[test]
    fn test_convert_sample_rate_keeps_duration() {
        let buf = ramp(22_050, 22_050, 1);
        let up = buf.convert(44_100, 1);
        assert_eq!(up.sample_rate(), 44_100);
        assert_eq!(up.frames(), 44_100);
        assert_eq!(up.duration_ms(), buf.duration_ms());
        // интерполяция не выходит за диапазон исходника
        assert!(up.samples().iter().all(|&s| (0.0..=1.0).contains(&s)));
    }
}
