//! Lookup tables for licenses and bearer tokens, built once from configuration.

use std::collections::HashMap;

use secrecy::ExposeSecret;
use uinveil::signature::constant_time_eq;
use uinveil_common::{Authentication, License};

use crate::config::DaemonConfig;

/// Licenses by id and the configured bearer tokens.
#[derive(Debug, Default)]
pub struct Registry {
    licenses: HashMap<String, License>,
    authentications: Vec<Authentication>,
}

impl Registry {
    /// Indexes the licenses and tokens of a validated configuration.
    #[must_use]
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.license.clone(), config.authentication.clone())
    }

    /// Builds a registry from explicit records.
    #[must_use]
    pub fn new(licenses: Vec<License>, authentications: Vec<Authentication>) -> Self {
        Self {
            licenses: licenses.into_iter().map(|l| (l.id.clone(), l)).collect(),
            authentications,
        }
    }

    /// Gets a license by id.
    #[must_use]
    pub fn license(&self, id: &str) -> Option<&License> {
        self.licenses.get(id)
    }

    /// Finds the authentication record for a bearer token.
    ///
    /// Every configured token is compared so the lookup time doesn't depend on
    /// which one matched.
    #[must_use]
    pub fn authentication(&self, token: &str) -> Option<&Authentication> {
        self.authentications
            .iter()
            .filter(|auth| constant_time_eq(auth.token.expose_secret().as_bytes(), token.as_bytes()))
            .last()
    }

    /// Number of configured licenses.
    #[must_use]
    pub fn license_count(&self) -> usize {
        self.licenses.len()
    }
}
