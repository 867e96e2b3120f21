// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Per application access policy.
//!
//! Parses the broker configuration file and answers whether a client
//! application may receive location updates, whether the decision has to be
//! deferred to an authorization agent and which agents are trusted.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::error;

/// The decision the policy store reaches for one client application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppPermission {
    /// The application must not receive location updates.
    Disallowed,
    /// No verdict is on file, an authorization agent has to decide.
    AskAgent,
    /// The application may receive location updates.
    Allowed,
}

/// One application entry of the configuration file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
struct AppEntry {
    allowed: bool,
    #[serde(default)]
    system: bool,
    /// User ids the entry applies to. An empty list means every user.
    #[serde(default)]
    users: Vec<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentSection {
    #[serde(default)]
    whitelist: Vec<String>,
}

/// Raw shape of the file. Application entries stay untyped here so that one
/// malformed entry only drops itself instead of failing the whole file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    agent: AgentSection,
    #[serde(default)]
    app: HashMap<String, toml::Value>,
}

/// Errors when loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The parsed access policy.
#[derive(Debug, Default)]
pub struct Config {
    agent_whitelist: Vec<String>,
    apps: HashMap<String, AppEntry>,
}

impl Config {
    /// Parses a policy from the TOML text of a configuration file.
    ///
    /// Malformed application entries are logged and dropped, every well
    /// formed entry stays usable.
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let mut apps = HashMap::new();
        for (desktop_id, value) in raw.app {
            match value.try_into::<AppEntry>() {
                Ok(entry) => {
                    apps.insert(desktop_id, entry);
                }
                Err(e) => {
                    error!("Failed to parse configuration entry for {desktop_id}. Error: {e}");
                }
            }
        }
        Ok(Config {
            agent_whitelist: raw.agent.whitelist,
            apps,
        })
    }

    /// Loads the policy from a configuration file on disk.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Config::parse(&content)
    }

    /// Returns whether the given desktop id may act as authorization agent.
    pub fn is_agent_allowed(&self, desktop_id: &str) -> bool {
        self.agent_whitelist.iter().any(|id| id == desktop_id)
    }

    /// Decides whether the application with the given desktop id may
    /// receive location updates when running as the given user.
    pub fn app_permission(&self, desktop_id: &str, uid: u32) -> AppPermission {
        let Some(entry) = self.apps.get(desktop_id) else {
            return AppPermission::AskAgent;
        };
        if !entry.allowed {
            return AppPermission::Disallowed;
        }
        if entry.users.is_empty() || entry.users.contains(&uid) {
            AppPermission::Allowed
        } else {
            AppPermission::Disallowed
        }
    }

    /// Returns whether the application is marked as a system component that
    /// bypasses agent authorization.
    pub fn is_system_component(&self, desktop_id: &str) -> bool {
        self.apps.get(desktop_id).is_some_and(|entry| entry.system)
    }
}
