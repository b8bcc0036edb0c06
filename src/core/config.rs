mod parsing;
mod settings;
mod types;

pub(crate) use types::{ConfigError, Environment, LayoutKind, Settings};
#[cfg(test)]
pub(crate) use types::{DEFAULT_PDF_RENDER_DPI, PDF_RENDER_DPI_RANGE};
