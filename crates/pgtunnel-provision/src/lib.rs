//! Credential provisioning for pgtunnel
//!
//! Talks to the platform API (temporary auth tokens) and the add-on API
//! (ad-hoc SSH and database users), and resolves the operator's own API token
//! from the environment, a file or the OS keychain.

mod client;
mod provider;
mod token_source;

pub use client::{HttpProvisioner, ProvisionerConfig, DEFAULT_ADDON_API_URL, DEFAULT_PLATFORM_API_URL};
pub use provider::{provision_credentials, AuthToken, CredentialProvisioner, Credentials};
pub use token_source::{TokenSource, TokenSourceError};
