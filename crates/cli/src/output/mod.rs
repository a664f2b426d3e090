//! Output formatting

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::TransferProgress;

/// Global output switches shared by every command
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit strict JSON instead of human-readable text
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
