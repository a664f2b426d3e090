//! encrypt / decrypt commands - Secret codec from the command line
//!
//! The key comes from the environment variable named by `secrets.key_env`
//! in the config (default `STOWAGE_SECRET_KEY`).

use std::io::Read;

use clap::Args;
use serde::Serialize;

use super::{load_config, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Encrypt a secret into an envelope
#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Plaintext to encrypt; read from stdin when omitted
    pub plaintext: Option<String>,
}

/// Decrypt an envelope
#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Envelope in `ciphertext_nonce_tag` form; read from stdin when omitted
    pub envelope: Option<String>,
}

#[derive(Debug, Serialize)]
struct EncryptOutput {
    envelope: String,
}

#[derive(Debug, Serialize)]
struct DecryptOutput {
    plaintext: String,
}

/// Execute the encrypt command
pub async fn execute_encrypt(args: EncryptArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match encrypt(args) {
        Ok(envelope) => {
            if formatter.is_json() {
                formatter.json(&EncryptOutput { envelope });
            } else {
                formatter.println(&envelope);
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}

/// Execute the decrypt command
pub async fn execute_decrypt(args: DecryptArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match decrypt(args) {
        Ok(plaintext) => {
            if formatter.is_json() {
                formatter.json(&DecryptOutput { plaintext });
            } else {
                formatter.println(&plaintext);
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}

fn encrypt(args: EncryptArgs) -> anyhow::Result<String> {
    let plaintext = input_or_stdin(args.plaintext)?;
    let cipher = load_config()?.secrets.load_cipher()?;
    Ok(cipher.encrypt(&plaintext)?)
}

fn decrypt(args: DecryptArgs) -> anyhow::Result<String> {
    let envelope = input_or_stdin(args.envelope)?;
    let cipher = load_config()?.secrets.load_cipher()?;
    Ok(cipher.decrypt(envelope.trim())?)
}

/// Use the argument when given, otherwise stdin without its trailing newline
fn input_or_stdin(value: Option<String>) -> anyhow::Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(strip_newline(buffer))
}

fn strip_newline(mut value: String) -> String {
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_newline() {
        assert_eq!(strip_newline("secret\n".to_string()), "secret");
        assert_eq!(strip_newline("secret\r\n".to_string()), "secret");
        assert_eq!(strip_newline("two\n\n".to_string()), "two\n");
        assert_eq!(strip_newline("plain".to_string()), "plain");
    }

    #[test]
    fn test_argument_wins_over_stdin() {
        assert_eq!(input_or_stdin(Some("given".into())).unwrap(), "given");
    }
}
