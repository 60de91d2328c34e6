//! Модуль аудиоданных и кодека

pub mod buffer;
pub mod codec;
pub mod format;

pub use buffer::AudioBuffer;
pub use codec::{AudioCodec, CodecError, SymphoniaCodec};
pub use format::{InputFormat, OutputFormat};
