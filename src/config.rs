//! Run configuration.
//!
//! [`ValidationConfig`] is assembled once from raw CI inputs and never
//! mutated afterwards. All invariants (port ranges, strategy selector,
//! API port for the per-call strategy, bridge endpoint for the session
//! strategy) are enforced in [`ValidationConfig::from_inputs`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::error::ConfigError;

/// Default transport (SSH) port.
pub const DEFAULT_TRANSPORT_PORT: u16 = 22;

/// Default directory holding PowerOn specfiles.
pub const DEFAULT_POWERON_DIRECTORY: &str = "REPWRITERSPECS/";

/// Default prefix for user-facing log lines.
pub const DEFAULT_LOG_PREFIX: &str = "[PowerOnGate]";

/// Selector for how the validation client talks to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// One stateful session for the whole run.
    PersistentSession,
    /// One stateless call per file.
    PerCall,
}

impl FromStr for ConnectionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent-session" | "ssh" => Ok(Self::PersistentSession),
            "per-call" | "https" => Ok(Self::PerCall),
            other => Err(ConfigError::InvalidConnectionType(other.to_string())),
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersistentSession => write!(f, "persistent-session"),
            Self::PerCall => write!(f, "per-call"),
        }
    }
}

/// Connection strategy with the data each variant requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStrategy {
    /// Stateful session opened through a validation bridge, which reaches
    /// the host over the transport port.
    PersistentSession {
        /// Bridge endpoint; its path always ends in `/`.
        bridge_url: Url,
    },
    /// Stateless calls against the host's API port.
    PerCall {
        /// Secondary (API) port.
        api_port: u16,
    },
}

impl ConnectionStrategy {
    /// Returns the selector this strategy was built from.
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            Self::PersistentSession { .. } => ConnectionType::PersistentSession,
            Self::PerCall { .. } => ConnectionType::PerCall,
        }
    }
}

/// Credentials for the system being validated.
#[derive(Clone, PartialEq, Eq)]
pub struct TargetSystem {
    /// Numeric system identifier (sym number).
    pub sym_number: u32,
    /// User number used to sign on.
    pub user_number: String,
    /// Password for the user number.
    pub password: String,
}

impl fmt::Debug for TargetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSystem")
            .field("sym_number", &self.sym_number)
            .field("user_number", &self.user_number)
            .field("password", &"****")
            .finish()
    }
}

/// Credentials and port for the transport session.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportSession {
    /// Transport username.
    pub username: String,
    /// Transport password.
    pub password: String,
    /// Transport port.
    pub port: u16,
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("username", &self.username)
            .field("password", &"****")
            .field("port", &self.port)
            .finish()
    }
}

/// Immutable configuration for one gate run.
#[derive(Clone)]
pub struct ValidationConfig {
    /// Host identity of the target system.
    pub host: String,
    /// Target-system credentials.
    pub target: TargetSystem,
    /// Transport-session credentials.
    pub transport: TransportSession,
    /// License key.
    pub api_key: String,
    /// Selected connection strategy.
    pub strategy: ConnectionStrategy,
    /// Directory to scan, relative to the repository root.
    pub directory: PathBuf,
    /// Branch to diff against; `None` means full scan.
    pub target_branch: Option<String>,
    /// Base names excluded from validation.
    pub ignored: BTreeSet<String>,
    /// Prefix for user-facing log lines.
    pub log_prefix: String,
    /// Verbose logging.
    pub debug: bool,
}

impl fmt::Debug for ValidationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationConfig")
            .field("host", &self.host)
            .field("target", &self.target)
            .field("transport", &self.transport)
            .field("api_key", &crate::error::mask_key(&self.api_key))
            .field("strategy", &self.strategy)
            .field("directory", &self.directory)
            .field("target_branch", &self.target_branch)
            .field("ignored", &self.ignored)
            .field("log_prefix", &self.log_prefix)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Raw, unvalidated inputs as read from the CI platform.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    /// Host identity.
    pub host: String,
    /// Sym number as text.
    pub sym_number: String,
    /// Target user number.
    pub user_number: String,
    /// Target user password.
    pub user_password: String,
    /// Transport username.
    pub transport_username: String,
    /// Transport password.
    pub transport_password: String,
    /// Transport port as text; empty means the default.
    pub transport_port: String,
    /// License key.
    pub api_key: String,
    /// Secondary API port as text; empty means unset.
    pub api_port: String,
    /// Validation bridge endpoint; required for the session strategy.
    pub bridge_url: String,
    /// Connection type selector.
    pub connection_type: String,
    /// Directory to scan; empty means the default.
    pub directory: String,
    /// Target branch; empty means unset.
    pub target_branch: String,
    /// Comma-separated base names to ignore.
    pub ignore: String,
    /// Log prefix; empty means the default.
    pub log_prefix: String,
    /// Verbose logging.
    pub debug: bool,
}

impl ValidationConfig {
    /// Validates raw inputs and builds the run configuration.
    pub fn from_inputs(raw: RawInputs) -> Result<Self, ConfigError> {
        let host = required("symitar-hostname", &raw.host)?;
        let sym_number = required("sym-number", &raw.sym_number)?;
        let sym_number = sym_number
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidSymNumber(sym_number.clone()))?;

        let transport_port = if raw.transport_port.trim().is_empty() {
            DEFAULT_TRANSPORT_PORT
        } else {
            parse_port("ssh-port", &raw.transport_port)?
        };

        let api_port = match raw.api_port.trim() {
            "" => None,
            value => Some(parse_port("symitar-app-port", value)?),
        };

        let connection_type = if raw.connection_type.trim().is_empty() {
            ConnectionType::PersistentSession
        } else {
            raw.connection_type.parse()?
        };

        let strategy = match (connection_type, api_port) {
            (ConnectionType::PersistentSession, _) => ConnectionStrategy::PersistentSession {
                bridge_url: parse_bridge_url(&raw.bridge_url)?,
            },
            (ConnectionType::PerCall, Some(api_port)) => ConnectionStrategy::PerCall { api_port },
            (ConnectionType::PerCall, None) => return Err(ConfigError::MissingApiPort),
        };

        let directory = match raw.directory.trim() {
            "" => PathBuf::from(DEFAULT_POWERON_DIRECTORY),
            dir => PathBuf::from(dir),
        };

        let target_branch = Some(raw.target_branch.trim().to_string()).filter(|b| !b.is_empty());

        let log_prefix = match raw.log_prefix.trim() {
            "" => DEFAULT_LOG_PREFIX.to_string(),
            prefix => prefix.to_string(),
        };

        Ok(Self {
            host,
            target: TargetSystem {
                sym_number,
                user_number: required("symitar-user-number", &raw.user_number)?,
                password: required("symitar-user-password", &raw.user_password)?,
            },
            transport: TransportSession {
                username: required("ssh-username", &raw.transport_username)?,
                password: required("ssh-password", &raw.transport_password)?,
                port: transport_port,
            },
            // An empty key is reported by the license check, not here.
            api_key: raw.api_key.trim().to_string(),
            strategy,
            directory,
            target_branch,
            ignored: parse_ignore_list(&raw.ignore),
            log_prefix,
            debug: raw.debug,
        })
    }

    /// Returns the connection type selector.
    pub fn connection_type(&self) -> ConnectionType {
        self.strategy.connection_type()
    }

    /// Returns true if `base_name` is in the ignore set.
    pub fn is_ignored(&self, base_name: &str) -> bool {
        self.ignored.contains(base_name)
    }
}

fn required(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingInput(name));
    }
    Ok(value.to_string())
}

/// Parses a port, rejecting anything outside 1..=65535.
pub fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    let invalid = || ConfigError::InvalidPort {
        name,
        value: value.to_string(),
    };
    let port = value.trim().parse::<u32>().map_err(|_| invalid())?;
    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(invalid()),
    }
}

/// Parses the bridge endpoint, normalizing its path to end in `/` so
/// relative joins stay below it.
pub fn parse_bridge_url(value: &str) -> Result<Url, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingBridgeUrl);
    }
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: value.to_string(),
        reason,
    };
    let mut url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Splits a comma-separated ignore list into trimmed, non-empty base names.
pub fn parse_ignore_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> RawInputs {
        RawInputs {
            host: "symitar01".to_string(),
            sym_number: "627".to_string(),
            user_number: "1995".to_string(),
            user_password: "hunter2".to_string(),
            transport_username: "ssh-user".to_string(),
            transport_password: "ssh-pass".to_string(),
            api_key: "license-key-123".to_string(),
            bridge_url: "https://bridge.example.com:8443".to_string(),
            ..RawInputs::default()
        }
    }

    #[test]
    fn defaults_apply_when_optional_inputs_are_empty() {
        let config = ValidationConfig::from_inputs(inputs()).unwrap();
        assert_eq!(config.transport.port, DEFAULT_TRANSPORT_PORT);
        assert_eq!(
            config.strategy,
            ConnectionStrategy::PersistentSession {
                bridge_url: Url::parse("https://bridge.example.com:8443/").unwrap()
            }
        );
        assert_eq!(config.directory, PathBuf::from(DEFAULT_POWERON_DIRECTORY));
        assert_eq!(config.log_prefix, DEFAULT_LOG_PREFIX);
        assert!(config.target_branch.is_none());
        assert!(config.ignored.is_empty());
        assert_eq!(config.target.sym_number, 627);
    }

    #[test]
    fn per_call_requires_api_port() {
        let raw = RawInputs {
            connection_type: "per-call".to_string(),
            ..inputs()
        };
        assert!(matches!(
            ValidationConfig::from_inputs(raw),
            Err(ConfigError::MissingApiPort)
        ));
    }

    #[test]
    fn session_requires_bridge_url() {
        let raw = RawInputs {
            bridge_url: String::new(),
            ..inputs()
        };
        assert!(matches!(
            ValidationConfig::from_inputs(raw),
            Err(ConfigError::MissingBridgeUrl)
        ));
    }

    #[test]
    fn bridge_url_is_distinct_from_transport_port() {
        let raw = RawInputs {
            transport_port: "2222".to_string(),
            bridge_url: "https://bridge.example.com/gate".to_string(),
            ..inputs()
        };
        let config = ValidationConfig::from_inputs(raw).unwrap();
        assert_eq!(config.transport.port, 2222);
        match config.strategy {
            ConnectionStrategy::PersistentSession { bridge_url } => {
                assert_eq!(bridge_url.as_str(), "https://bridge.example.com/gate/");
                assert_eq!(bridge_url.port_or_known_default(), Some(443));
            }
            other => panic!("unexpected strategy: {other:?}"),
        }
        assert!(matches!(
            parse_bridge_url("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn per_call_ignores_bridge_url() {
        let raw = RawInputs {
            connection_type: "per-call".to_string(),
            api_port: "42627".to_string(),
            bridge_url: String::new(),
            ..inputs()
        };
        assert!(ValidationConfig::from_inputs(raw).is_ok());
    }

    #[test]
    fn per_call_with_api_port() {
        let raw = RawInputs {
            connection_type: "https".to_string(),
            api_port: "42627".to_string(),
            ..inputs()
        };
        let config = ValidationConfig::from_inputs(raw).unwrap();
        assert_eq!(config.strategy, ConnectionStrategy::PerCall { api_port: 42627 });
        assert_eq!(config.connection_type(), ConnectionType::PerCall);
    }

    #[test]
    fn connection_type_accepts_exactly_two_strategies() {
        assert_eq!(
            "persistent-session".parse::<ConnectionType>().unwrap(),
            ConnectionType::PersistentSession
        );
        assert_eq!("SSH".parse::<ConnectionType>().unwrap(), ConnectionType::PersistentSession);
        assert_eq!("per-call".parse::<ConnectionType>().unwrap(), ConnectionType::PerCall);
        assert!("telnet".parse::<ConnectionType>().is_err());
    }

    #[test]
    fn ports_outside_range_are_rejected() {
        assert!(parse_port("ssh-port", "0").is_err());
        assert!(parse_port("ssh-port", "65536").is_err());
        assert!(parse_port("ssh-port", "-1").is_err());
        assert!(parse_port("ssh-port", "ssh").is_err());
        assert_eq!(parse_port("ssh-port", "1").unwrap(), 1);
        assert_eq!(parse_port("ssh-port", " 65535 ").unwrap(), 65535);
    }

    #[test]
    fn ignore_list_is_trimmed_and_deduplicated() {
        let ignored = parse_ignore_list(" A.PO, B.PO ,,A.PO,");
        assert_eq!(ignored.len(), 2);
        assert!(ignored.contains("A.PO"));
        assert!(ignored.contains("B.PO"));
    }

    #[test]
    fn missing_host_is_reported() {
        let raw = RawInputs {
            host: "  ".to_string(),
            ..inputs()
        };
        assert!(matches!(
            ValidationConfig::from_inputs(raw),
            Err(ConfigError::MissingInput("symitar-hostname"))
        ));
    }

    #[test]
    fn non_numeric_sym_number_is_rejected() {
        let raw = RawInputs {
            sym_number: "sym627".to_string(),
            ..inputs()
        };
        assert!(matches!(
            ValidationConfig::from_inputs(raw),
            Err(ConfigError::InvalidSymNumber(_))
        ));
    }

    #[test]
    fn debug_output_masks_secrets() {
        let config = ValidationConfig::from_inputs(inputs()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("ssh-pass"));
        assert!(!debug.contains("license-key-123"));
    }
}
