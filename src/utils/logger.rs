//! Модуль настройки логирования

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр логов по умолчанию
const DEFAULT_FILTER: &str = "warn,audio_overlay=info";

/// Инициализирует логгер
///
/// `RUST_LOG` переопределяет фильтр по умолчанию.
pub fn init_logger() {
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);

    let mut builder = Builder::from_env(env);

    // Шумные зависимости
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("symphonia_core", LevelFilter::Warn)
        .filter_module("symphonia_bundle_mp3", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    // Тесты и демо могут вызывать инициализацию повторно
    let _ = builder.try_init();
}
