//! share command - Generate presigned URLs
//!
//! Creates time-limited URLs for sharing objects without handing out
//! credentials. Local descriptors yield a `file://` URL.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::{load_config, report, resolve};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Longest expiry most S3-compatible services accept (7 days)
const MAX_EXPIRY_SECS: u64 = 604800;

/// Generate a presigned download URL
#[derive(Args, Debug)]
pub struct ShareArgs {
    /// Descriptor file (JSON)
    pub descriptor: PathBuf,

    /// Expiration time (e.g., 1h, 1d, 7d). Default: 7d
    #[arg(short, long, default_value = "7d")]
    pub expire: String,
}

#[derive(Debug, Serialize)]
struct ShareOutput {
    url: String,
    location: String,
    expires_in: String,
    expires_secs: u64,
}

/// Execute the share command
pub async fn execute(args: ShareArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let expires_secs = match parse_expiration(&args.expire) {
        Ok(secs) => secs,
        Err(e) => {
            formatter.error(&e);
            return ExitCode::UsageError;
        }
    };

    if expires_secs > MAX_EXPIRY_SECS {
        formatter.error("Expiration cannot exceed 7 days (604800 seconds)");
        return ExitCode::UsageError;
    }

    let (url, location) = match run(&args, expires_secs).await {
        Ok(shared) => shared,
        Err(e) => return report(&formatter, &e),
    };

    let expires_human = format_duration(expires_secs);
    if formatter.is_json() {
        formatter.json(&ShareOutput {
            url,
            location,
            expires_in: expires_human,
            expires_secs,
        });
    } else {
        formatter.println(&format!("Share URL for {location}:"));
        formatter.println(&formatter.style_url(&url));
        formatter.println("");
        formatter.println(&format!("Expires in: {expires_human}"));
    }

    ExitCode::Success
}

async fn run(args: &ShareArgs, expires_secs: u64) -> anyhow::Result<(String, String)> {
    let config = load_config()?;
    let resolved = resolve(&args.descriptor, &config).await?;
    let path = resolved.descriptor.path();

    // a URL for a missing object is useless, so fail early
    resolved.client.stat(path).await?;
    let url = resolved.client.presign_read(path, expires_secs).await?;
    Ok((url, resolved.descriptor.location()))
}

/// Parse expiration string (e.g., "1h", "1d", "7d")
fn parse_expiration(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Expiration cannot be empty".to_string());
    }

    let (num_str, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let idx = s.len() - 1;
        (&s[..idx], &s[idx..])
    } else {
        (s, "s") // Default to seconds
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("Invalid expiration number: {num_str}"))?;

    let unit: u64 = match suffix.to_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 604800,
        _ => return Err(format!("Unknown expiration suffix: {suffix}")),
    };

    num.checked_mul(unit)
        .ok_or_else(|| format!("Expiration too large: {s}"))
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs >= 86400 {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{days}d {hours}h")
        } else {
            format!("{days} day(s)")
        }
    } else if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{hours}h {mins}m")
        } else {
            format!("{hours} hour(s)")
        }
    } else if secs >= 60 {
        let mins = secs / 60;
        format!("{mins} minute(s)")
    } else {
        format!("{secs} second(s)")
    }
}
