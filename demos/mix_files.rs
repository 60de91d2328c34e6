//! Наложение двух локальных файлов без HTTP
//!
//! ```text
//! cargo run --example mix_files -- speech.mp3 music.mp3 [output_dir]
//! ```
//!
//! Пишет `combined_audio_<timestamp>.mp3` в `output_dir` (по умолчанию
//! `output_audio`) с пятью секундами музыки после речи и трёхсекундными
//! затуханиями.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use audio_overlay::engine::{overlay, OverlayParams};
use audio_overlay::media::{AudioCodec, InputFormat, OutputFormat, SymphoniaCodec};
use log::info;

/// Читает и декодирует файл, формат берётся из имени
fn decode(codec: &SymphoniaCodec, path: &Path) -> Result<audio_overlay::AudioBuffer> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let format = InputFormat::from_filename(name)?;
    let data = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    codec
        .decode(&data, format)
        .with_context(|| format!("cannot decode {}", path.display()))
}

fn main() -> Result<()> {
    audio_overlay::utils::logger::init_logger();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: mix_files <speech> <music> [output_dir]");
    }
    let output_dir = PathBuf::from(args.get(2).map(String::as_str).unwrap_or("output_audio"));
    std::fs::create_dir_all(&output_dir)?;

    let codec = SymphoniaCodec::default();
    let speech = decode(&codec, Path::new(&args[0]))?;
    let music = decode(&codec, Path::new(&args[1]))?;

    let params = OverlayParams {
        music_volume_adjustment_db: -10,
        ..OverlayParams::form_defaults()
    };
    let mixed = overlay(&speech, &music, &params);
    let encoded = codec.encode(&mixed, OutputFormat::Mp3)?;

    let output_path = output_dir.join(format!(
        "combined_audio_{}.mp3",
        chrono::Local::now().format("%Y%m%d%H%M%S")
    ));
    std::fs::write(&output_path, encoded)?;

    info!(
        "Wrote {} ({:.2}s)",
        output_path.display(),
        mixed.duration_secs()
    );
    println!("{}", output_path.display());
    Ok(())
}
