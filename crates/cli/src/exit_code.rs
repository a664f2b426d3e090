//! Process exit codes
//!
//! Scripts branch on these, so the numeric values are stable.

/// Exit status of a `stow` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments, descriptor or configuration
    UsageError = 2,
    NetworkError = 3,
    /// Rejected credentials, or a secret that could not be decrypted
    AuthError = 4,
    NotFound = 5,
    /// Fewer bytes arrived than the source reported, or the transfer
    /// was interrupted
    IncompleteTransfer = 6,
}

impl ExitCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::IncompleteTransfer),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
