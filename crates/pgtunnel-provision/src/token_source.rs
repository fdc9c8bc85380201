//! Where the operator's platform API token comes from
//!
//! - `env://VAR_NAME` - environment variable
//! - `file:///path/to/token` - file content
//! - `keychain://service/key` - OS keychain (feature `keychain`)
//! - anything else - the token itself

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenSourceError {
    #[error("Invalid token source '{source_str}': {reason}")]
    Invalid { source_str: String, reason: String },

    #[error("Environment variable '{0}' not set")]
    EnvNotSet(String),

    #[error("Failed to read token file '{path}': {message}")]
    File { path: PathBuf, message: String },

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Keychain support not compiled in")]
    KeychainDisabled,

    #[error("API token from {0} is empty")]
    Empty(&'static str),
}

/// A reference to the operator's API token
#[derive(Clone, PartialEq)]
pub enum TokenSource {
    Literal(String),
    Env { var_name: String },
    File { path: PathBuf },
    Keychain { service: String, key: String },
}

impl TokenSource {
    fn kind(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Env { .. } => "env",
            Self::File { .. } => "file",
            Self::Keychain { .. } => "keychain",
        }
    }

    /// Read the token, trimmed. An empty token is an error.
    pub fn resolve(&self) -> Result<String, TokenSourceError> {
        tracing::debug!(source = self.kind(), "Resolving API token");

        let raw = match self {
            Self::Literal(value) => value.clone(),
            Self::Env { var_name } => std::env::var(var_name)
                .map_err(|_| TokenSourceError::EnvNotSet(var_name.clone()))?,
            Self::File { path } => {
                std::fs::read_to_string(path).map_err(|e| TokenSourceError::File {
                    path: path.clone(),
                    message: e.to_string(),
                })?
            }
            Self::Keychain { service, key } => keychain(service, key)?,
        };

        let token = raw.trim();
        if token.is_empty() {
            return Err(TokenSourceError::Empty(self.kind()));
        }
        Ok(token.to_string())
    }
}

#[cfg(feature = "keychain")]
fn keychain(service: &str, key: &str) -> Result<String, TokenSourceError> {
    let entry = keyring::Entry::new(service, key)
        .map_err(|e| TokenSourceError::Keychain(e.to_string()))?;

    entry.get_password().map_err(|e| match e {
        keyring::Error::NoEntry => {
            TokenSourceError::Keychain(format!("no entry for {}/{}", service, key))
        }
        keyring::Error::NoStorageAccess(inner) => {
            TokenSourceError::Keychain(format!("cannot access keychain storage: {}", inner))
        }
        other => TokenSourceError::Keychain(other.to_string()),
    })
}

#[cfg(not(feature = "keychain"))]
fn keychain(_service: &str, _key: &str) -> Result<String, TokenSourceError> {
    Err(TokenSourceError::KeychainDisabled)
}

// Never print a literal token
impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(_) => write!(f, "Literal(<redacted>)"),
            Self::Env { var_name } => write!(f, "Env({})", var_name),
            Self::File { path } => write!(f, "File({})", path.display()),
            Self::Keychain { service, key } => write!(f, "Keychain({}/{})", service, key),
        }
    }
}

impl FromStr for TokenSource {
    type Err = TokenSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TokenSourceError::Invalid {
            source_str: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(var_name) = s.strip_prefix("env://") {
            if var_name.is_empty() {
                return Err(invalid("env source must name a variable"));
            }
            Ok(Self::Env {
                var_name: var_name.to_string(),
            })
        } else if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(invalid("file source must specify a path"));
            }
            Ok(Self::File {
                path: PathBuf::from(path),
            })
        } else if let Some(rest) = s.strip_prefix("keychain://") {
            match rest.split_once('/') {
                Some((service, key)) if !service.is_empty() && !key.is_empty() => {
                    Ok(Self::Keychain {
                        service: service.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => Err(invalid("keychain source must be keychain://service/key")),
            }
        } else {
            Ok(Self::Literal(s.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for TokenSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TokenSource::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_sources() {
        assert_eq!(
            "env://PLATFORM_TOKEN".parse::<TokenSource>().unwrap(),
            TokenSource::Env {
                var_name: "PLATFORM_TOKEN".to_string()
            }
        );
        assert_eq!(
            "file:///home/me/.token".parse::<TokenSource>().unwrap(),
            TokenSource::File {
                path: PathBuf::from("/home/me/.token")
            }
        );
        assert_eq!(
            "keychain://pgtunnel/api-token".parse::<TokenSource>().unwrap(),
            TokenSource::Keychain {
                service: "pgtunnel".to_string(),
                key: "api-token".to_string()
            }
        );
        assert_eq!(
            "abc123".parse::<TokenSource>().unwrap(),
            TokenSource::Literal("abc123".to_string())
        );
    }

    #[test]
    fn test_parse_invalid_sources() {
        assert!("env://".parse::<TokenSource>().is_err());
        assert!("file://".parse::<TokenSource>().is_err());
        assert!("keychain://only-service".parse::<TokenSource>().is_err());
    }

    #[test]
    fn test_resolve_env() {
        std::env::set_var("PGTUNNEL_TEST_TOKEN_SOURCE", "  env-token \n");
        let source: TokenSource = "env://PGTUNNEL_TEST_TOKEN_SOURCE".parse().unwrap();
        assert_eq!(source.resolve().unwrap(), "env-token");
        std::env::remove_var("PGTUNNEL_TEST_TOKEN_SOURCE");

        let missing: TokenSource = "env://PGTUNNEL_DEFINITELY_NOT_SET_12345".parse().unwrap();
        assert!(matches!(
            missing.resolve(),
            Err(TokenSourceError::EnvNotSet(_))
        ));
    }

    #[test]
    fn test_resolve_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "file-token").unwrap();

        let source = TokenSource::File {
            path: file.path().to_path_buf(),
        };
        assert_eq!(source.resolve().unwrap(), "file-token");

        let missing = TokenSource::File {
            path: PathBuf::from("/definitely/not/a/real/path/12345"),
        };
        assert!(matches!(missing.resolve(), Err(TokenSourceError::File { .. })));
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let source = TokenSource::Literal("   ".to_string());
        assert!(matches!(source.resolve(), Err(TokenSourceError::Empty(_))));
    }

    #[test]
    fn test_debug_hides_literal() {
        let source = TokenSource::Literal("super-secret".to_string());
        assert!(!format!("{:?}", source).contains("super-secret"));
    }
}
