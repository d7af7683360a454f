use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Capability negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapError {
    /// A requested capability was never advertised.
    #[error("unknown capability: {0}")]
    Unknown(String),
}

/// One entry of a validated `CAP REQ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapChange {
    Enable(String),
    Disable(String),
}

impl CapChange {
    #[cfg(test)]
    pub fn name(&self) -> &str {
        match self {
            CapChange::Enable(name) | CapChange::Disable(name) => name,
        }
    }
}

/// Per-connection capability state: what is available, what is enabled, and
/// whether negotiation is holding back registration.
///
/// A capability can only be enabled while it is available.
#[derive(Debug, Clone, Default)]
pub struct CapRegistry {
    available: BTreeMap<String, String>,
    enabled: BTreeSet<String>,
    negotiating: bool,
    version: u32,
}

impl CapRegistry {
    pub fn new() -> Self {
        Self {
            version: 301,
            ..Self::default()
        }
    }

    /// Add or update an available capability. An empty `params` means the
    /// capability carries no value.
    pub fn advertise(&mut self, name: &str, params: &str) {
        self.available.insert(name.to_string(), params.to_string());
    }

    /// Remove a capability, disabling it if it was enabled.
    pub fn withdraw(&mut self, name: &str) {
        self.available.remove(name);
        self.enabled.remove(name);
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.available.contains_key(name)
    }

    #[cfg(test)]
    pub fn available_value(&self, name: &str) -> Option<&str> {
        self.available.get(name).map(String::as_str)
    }

    /// Validate a space-separated `CAP REQ` list. `-name` asks for removal.
    ///
    /// Nothing is changed; the first unknown token fails the whole request.
    pub fn request<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<CapChange>, CapError> {
        names
            .into_iter()
            .map(|token| {
                let (disable, name) = match token.strip_prefix('-') {
                    Some(name) => (true, name),
                    None => (false, token),
                };
                if !self.is_available(name) {
                    return Err(CapError::Unknown(token.to_string()));
                }
                Ok(if disable {
                    CapChange::Disable(name.to_string())
                } else {
                    CapChange::Enable(name.to_string())
                })
            })
            .collect()
    }

    /// Apply a validated request.
    pub fn apply(&mut self, changes: &[CapChange]) {
        for change in changes {
            match change {
                CapChange::Enable(name) => self.enable([name.as_str()]),
                CapChange::Disable(name) => self.disable([name.as_str()]),
            }
        }
    }

    /// Enable every name that is currently available; others are ignored.
    pub fn enable<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if self.available.contains_key(name) {
                self.enabled.insert(name.to_string());
            }
        }
    }

    pub fn disable<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.enabled.remove(name);
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }

    pub fn set_negotiating(&mut self, negotiating: bool) {
        self.negotiating = negotiating;
    }

    pub fn is_negotiating(&self) -> bool {
        self.negotiating
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    #[cfg(test)]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// `CAP LS` tokens. Values are only sent to 302 clients.
    pub fn ls_tokens(&self) -> Vec<String> {
        self.available
            .iter()
            .map(|(name, value)| {
                if self.version >= 302 && !value.is_empty() {
                    format!("{}={}", name, value)
                } else {
                    name.clone()
                }
            })
            .collect()
    }
}
