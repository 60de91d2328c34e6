//! Вспомогательные модули

pub mod logger;
pub mod temp;

pub use temp::RequestWorkspace;
