//! Tool input validation.

use std::net::IpAddr;

use crate::error::DebuggerError;

/// Validation limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Maximum command length in bytes.
    pub max_command_length: usize,
    /// Maximum session id length.
    pub max_session_id_length: usize,
    /// Largest page size a caller may request.
    pub max_lines_limit: usize,
    /// Longest CPU profile a caller may request, in seconds.
    pub max_profile_seconds: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_command_length: 4096,
            max_session_id_length: 64,
            max_lines_limit: 100_000,
            max_profile_seconds: 3600,
        }
    }
}

/// Checks request fields before they reach a session or a subprocess.
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    config: ValidationConfig,
}

impl InputValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Empty, an IP address, or an RFC 1123 host name.
    pub fn validate_host(&self, host: &str) -> Result<(), ValidationError> {
        if host.is_empty() || host.parse::<IpAddr>().is_ok() || is_hostname(host) {
            Ok(())
        } else {
            Err(ValidationError::InvalidHost(host.to_string()))
        }
    }

    pub fn validate_port(&self, port: u32) -> Result<u16, ValidationError> {
        u16::try_from(port).map_err(|_| ValidationError::PortOutOfRange(port))
    }

    /// A single debugger command line.
    ///
    /// Line breaks are rejected: they would inject extra commands and
    /// desynchronise response framing.
    pub fn validate_command(&self, command: &str) -> Result<(), ValidationError> {
        if command.len() > self.config.max_command_length {
            return Err(ValidationError::CommandTooLong {
                length: command.len(),
                max: self.config.max_command_length,
            });
        }
        if let Some(c) = command.chars().find(|c| matches!(c, '\0' | '\n' | '\r')) {
            return Err(ValidationError::InvalidCharacter(c));
        }
        Ok(())
    }

    /// Empty, or ASCII alphanumeric within the length limit.
    pub fn validate_session_id(&self, id: &str) -> Result<(), ValidationError> {
        if id.len() > self.config.max_session_id_length {
            return Err(ValidationError::SessionIdTooLong {
                length: id.len(),
                max: self.config.max_session_id_length,
            });
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidSessionId(id.to_string()));
        }
        Ok(())
    }

    /// A connection identity used as a session key: visible ASCII within
    /// the session id length limit.
    pub fn validate_caller_identity(&self, id: &str) -> Result<(), ValidationError> {
        if id.len() > self.config.max_session_id_length {
            return Err(ValidationError::SessionIdTooLong {
                length: id.len(),
                max: self.config.max_session_id_length,
            });
        }
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCallerIdentity(id.to_string()));
        }
        Ok(())
    }

    pub fn validate_max_lines(&self, max_lines: usize) -> Result<(), ValidationError> {
        if max_lines > self.config.max_lines_limit {
            return Err(ValidationError::MaxLinesTooLarge {
                value: max_lines,
                max: self.config.max_lines_limit,
            });
        }
        Ok(())
    }

    /// A pprof profile name: letters, digits, `_` and `-`.
    pub fn validate_profile(&self, profile: &str) -> Result<(), ValidationError> {
        let valid = !profile.is_empty()
            && profile
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(ValidationError::InvalidProfile(profile.to_string()))
        }
    }

    pub fn validate_seconds(&self, seconds: u64) -> Result<(), ValidationError> {
        if seconds > self.config.max_profile_seconds {
            return Err(ValidationError::SecondsTooLarge {
                value: seconds,
                max: self.config.max_profile_seconds,
            });
        }
        Ok(())
    }
}

fn is_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidHost(String),
    PortOutOfRange(u32),
    CommandTooLong { length: usize, max: usize },
    InvalidCharacter(char),
    SessionIdTooLong { length: usize, max: usize },
    InvalidSessionId(String),
    InvalidCallerIdentity(String),
    MaxLinesTooLarge { value: usize, max: usize },
    InvalidProfile(String),
    SecondsTooLarge { value: u64, max: u64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHost(host) => write!(f, "host {:?} is not a hostname or IP address", host),
            Self::PortOutOfRange(port) => write!(f, "port {} out of range (max: 65535)", port),
            Self::CommandTooLong { length, max } => {
                write!(f, "command too long: {} bytes (max: {})", length, max)
            }
            Self::InvalidCharacter(c) => write!(f, "command contains invalid character: {:?}", c),
            Self::SessionIdTooLong { length, max } => {
                write!(f, "session_id too long: {} chars (max: {})", length, max)
            }
            Self::InvalidSessionId(id) => {
                write!(f, "session_id {:?} must be alphanumeric", id)
            }
            Self::InvalidCallerIdentity(id) => {
                write!(f, "caller identity {:?} must be visible ASCII", id)
            }
            Self::MaxLinesTooLarge { value, max } => {
                write!(f, "max_lines {} too large (max: {})", value, max)
            }
            Self::InvalidProfile(p) => write!(f, "invalid profile name {:?}", p),
            Self::SecondsTooLarge { value, max } => {
                write!(f, "seconds {} too large (max: {})", value, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for DebuggerError {
    fn from(e: ValidationError) -> Self {
        DebuggerError::Validation(e.to_string())
    }
}
