//! WiFi configuration data structures.
//!
//! Platform-independent types for station credentials and soft-AP
//! configuration. Everything here is testable on the host machine.
//!
//! # Example
//!
//! ```
//! use iot_bringup_esp32::wifi::Credentials;
//!
//! let credentials = Credentials::new("MyNetwork", "MyPassword").unwrap();
//! assert!(!credentials.is_open());
//! ```

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Default client limit for soft-AP mode.
pub const DEFAULT_MAX_AP_CONNECTIONS: u8 = 3;

/// WiFi radio mode. Exactly one is active at a time; transitions are
/// explicit calls on the controller, never implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Client of an existing access point.
    Station,
    /// The device itself acts as an access point.
    AccessPoint,
    /// Station and access point simultaneously.
    Mixed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Station => write!(f, "station"),
            Self::AccessPoint => write!(f, "access-point"),
            Self::Mixed => write!(f, "station+access-point"),
        }
    }
}

/// Station credentials for connecting to an access point.
///
/// Over-long fields are rejected at construction, never truncated. The
/// fields are private so every instance has passed [`Self::validate`];
/// the password is wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Network SSID (1-32 bytes).
    pub(crate) ssid: String,
    /// Network password (8-64 bytes for WPA2, empty for open networks).
    pub(crate) password: String,
    /// Target BSSID, if the provisioning flow pinned one.
    pub(crate) bssid: Option<[u8; 6]>,
}

impl Credentials {
    /// Create new station credentials.
    ///
    /// Returns an error if SSID or password are out of bounds.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let credentials = Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid: None,
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Create credentials for an open network (no password).
    pub fn open(ssid: impl Into<String>) -> Result<Self, CredentialsError> {
        Self::new(ssid, String::new())
    }

    /// Pin the credentials to a specific BSSID.
    pub fn with_bssid(mut self, bssid: [u8; 6]) -> Self {
        self.bssid = Some(bssid);
        self
    }

    /// Validate field bounds.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.ssid.is_empty() {
            return Err(CredentialsError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(CredentialsError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // Empty password is OK for open networks
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(CredentialsError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(CredentialsError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }

        Ok(())
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Network SSID.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Network password; empty for open networks.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Pinned BSSID, if any.
    pub fn bssid(&self) -> Option<[u8; 6]> {
        self.bssid
    }

    /// Serialize for non-volatile storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][password_len:1][password:M][bssid_flag:1][bssid:6?]`
    pub fn to_bytes(&self) -> Vec<u8> {
        // Field lengths fit in the one-byte prefixes for validated instances.
        debug_assert!(self.validate().is_ok(), "serializing unvalidated credentials");

        let mut bytes = Vec::with_capacity(3 + self.ssid.len() + self.password.len() + 6);
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        match self.bssid {
            Some(bssid) => {
                bytes.push(1);
                bytes.extend_from_slice(&bssid);
            }
            None => bytes.push(0),
        }
        bytes
    }

    /// Deserialize from a storage blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CredentialsError> {
        if bytes.is_empty() {
            return Err(CredentialsError::InvalidFormat("empty data".into()));
        }

        let ssid_len = bytes[0] as usize;
        if bytes.len() < 1 + ssid_len + 1 {
            return Err(CredentialsError::InvalidFormat("truncated SSID".into()));
        }

        let ssid = String::from_utf8(bytes[1..1 + ssid_len].to_vec())
            .map_err(|_| CredentialsError::InvalidFormat("invalid SSID UTF-8".into()))?;

        let password_len = bytes[1 + ssid_len] as usize;
        let password_start = 2 + ssid_len;
        if bytes.len() < password_start + password_len {
            return Err(CredentialsError::InvalidFormat("truncated password".into()));
        }

        let password =
            String::from_utf8(bytes[password_start..password_start + password_len].to_vec())
                .map_err(|_| CredentialsError::InvalidFormat("invalid password UTF-8".into()))?;

        let mut credentials = Self::new(ssid, password)?;

        // Blobs written before the BSSID field was added end here.
        let rest = &bytes[password_start + password_len..];
        if let Some((&flag, tail)) = rest.split_first() {
            if flag == 1 {
                let bssid: [u8; 6] = tail
                    .get(..6)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| CredentialsError::InvalidFormat("truncated BSSID".into()))?;
                credentials = credentials.with_bssid(bssid);
            }
        }

        Ok(credentials)
    }
}

// Manual Debug so the password never ends up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("bssid", &self.bssid)
            .finish()
    }
}

/// Soft-AP configuration.
///
/// A missing password means open auth; a present one means WPA/WPA2-PSK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    /// AP SSID (1-32 bytes).
    pub ssid: String,
    /// AP password; `None` for an open network.
    pub password: Option<String>,
    /// Radio channel.
    pub channel: u8,
    /// Maximum simultaneous clients.
    pub max_connections: u8,
}

impl AccessPointConfig {
    /// Create a new soft-AP configuration with the default client limit.
    pub fn new(
        ssid: impl Into<String>,
        password: Option<String>,
        channel: u8,
    ) -> Result<Self, CredentialsError> {
        let config = Self {
            ssid: ssid.into(),
            password,
            channel,
            max_connections: DEFAULT_MAX_AP_CONNECTIONS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate field bounds.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.ssid.is_empty() {
            return Err(CredentialsError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(CredentialsError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if let Some(password) = &self.password {
            if password.len() < MIN_PASSWORD_LEN {
                return Err(CredentialsError::PasswordTooShort {
                    len: password.len(),
                    min: MIN_PASSWORD_LEN,
                });
            }
            if password.len() > MAX_PASSWORD_LEN {
                return Err(CredentialsError::PasswordTooLong {
                    len: password.len(),
                    max: MAX_PASSWORD_LEN,
                });
            }
        }
        Ok(())
    }

    /// Check whether the AP runs with open auth.
    pub fn is_open(&self) -> bool {
        self.password.is_none()
    }
}

/// Errors from credential or AP configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Invalid data format during deserialization.
    InvalidFormat(String),
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for CredentialsError {}
