//! Output formatter for human-readable and JSON output
//!
//! Every command prints through a [`Formatter`] so that `--json`,
//! `--quiet` and `--no-color` behave the same everywhere.

use console::Style;
use serde::Serialize;

use super::OutputConfig;

/// Color theme for styled output
#[derive(Debug, Clone)]
pub struct Theme {
    /// Sizes and byte counts - green
    pub size: Style,
    /// Timestamps - dim
    pub date: Style,
    /// Property keys (stat output) - cyan
    pub key: Style,
    /// URLs and locations - cyan + underline
    pub url: Style,
    pub success: Style,
    pub error: Style,
    pub warning: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            size: Style::new().green(),
            date: Style::new().dim(),
            key: Style::new().cyan(),
            url: Style::new().cyan().underlined(),
            success: Style::new().green(),
            error: Style::new().red(),
            warning: Style::new().yellow(),
        }
    }
}

impl Theme {
    /// Returns a theme with no styling (for no-color mode)
    pub fn plain() -> Self {
        Self {
            size: Style::new(),
            date: Style::new(),
            key: Style::new(),
            url: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warning: Style::new(),
        }
    }
}

/// Formatter for CLI output
///
/// When JSON mode is enabled, all output is strict JSON without colors or progress.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    theme: Theme,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        let theme = if config.no_color || config.json {
            Theme::plain()
        } else {
            Theme::default()
        };
        Self { config, theme }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Whether a progress bar may be drawn
    pub fn shows_progress(&self) -> bool {
        !self.config.quiet && !self.config.json
    }

    pub fn style_size(&self, text: &str) -> String {
        self.theme.size.apply_to(text).to_string()
    }

    pub fn style_date(&self, text: &str) -> String {
        self.theme.date.apply_to(text).to_string()
    }

    pub fn style_key(&self, text: &str) -> String {
        self.theme.key.apply_to(text).to_string()
    }

    pub fn style_url(&self, text: &str) -> String {
        self.theme.url.apply_to(text).to_string()
    }

    /// Human-readable byte count, e.g. `5 MiB`
    pub fn format_size(&self, bytes: u64) -> String {
        humansize::format_size(bytes, humansize::BINARY)
    }

    /// Print an aligned `key: value` line
    pub fn field(&self, key: &str, value: &str) {
        self.println(&format!("{} {value}", self.style_key(&format!("{key:<14}"))));
    }

    /// Output a success message
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }

        let checkmark = self.theme.success.apply_to("✓");
        println!("{checkmark} {message}");
    }

    /// Output an error message
    ///
    /// Errors are always printed, even in quiet mode.
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({
                "error": message
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            let cross = self.theme.error.apply_to("✗");
            eprintln!("{cross} {message}");
        }
    }

    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }

        let warn_icon = self.theme.warning.apply_to("⚠");
        eprintln!("{warn_icon} {message}");
    }

    /// Output JSON directly
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet mode)
    pub fn println(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        println!("{message}");
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
