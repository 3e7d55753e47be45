use std::path::Path;

use facet::Facet;

use crate::error::DeckError;
use crate::paths;

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default)]
    pub connections: ConnectionsConfig,
    #[facet(default)]
    pub dispatch: DispatchConfig,
    #[facet(default)]
    pub helpers: HelpersConfig,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ConnectionsConfig {
    #[facet(default = "qemu:///system")]
    pub system: String,
    #[facet(default = "qemu:///session")]
    pub session: String,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            system: "qemu:///system".into(),
            session: "qemu:///session".into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct DispatchConfig {
    /// `settle` or `state-change`.
    #[facet(default = "settle")]
    pub busy: String,
    #[facet(default = 30)]
    pub state_change_timeout_s: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            busy: "settle".into(),
            state_change_timeout_s: 30,
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct HelpersConfig {
    #[facet(default = "virt-clone")]
    pub clone: String,
    #[facet(default = "virt-xml")]
    pub cpu_edit: String,
    #[facet(default = "virt-install")]
    pub install: String,
}

impl Default for HelpersConfig {
    fn default() -> Self {
        Self {
            clone: "virt-clone".into(),
            cpu_edit: "virt-xml".into(),
            install: "virt-install".into(),
        }
    }
}

/// When the busy indicator of a run/shutdown ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// As soon as the remote call settles.
    #[default]
    Settle,
    /// On failure immediately; on success only once a refresh reports a
    /// state different from the one seen before dispatch.
    StateChange,
}

impl BusyPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "settle" => Some(BusyPolicy::Settle),
            "state-change" => Some(BusyPolicy::StateChange),
            _ => None,
        }
    }
}

impl Config {
    pub fn busy_policy(&self) -> BusyPolicy {
        BusyPolicy::parse(&self.dispatch.busy).unwrap_or_default()
    }

    pub fn state_change_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch.state_change_timeout_s)
    }
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), DeckError> {
    for (label, uri) in [
        ("connections.system", &config.connections.system),
        ("connections.session", &config.connections.session),
    ] {
        if uri.trim().is_empty() {
            return Err(DeckError::Validation {
                message: format!("{label} must not be empty"),
            });
        }
    }

    if BusyPolicy::parse(&config.dispatch.busy).is_none() {
        return Err(DeckError::Validation {
            message: format!(
                "dispatch.busy must be 'settle' or 'state-change' (got '{}')",
                config.dispatch.busy
            ),
        });
    }

    if config.dispatch.state_change_timeout_s == 0 {
        return Err(DeckError::Validation {
            message: "dispatch.state_change_timeout_s must be at least 1".into(),
        });
    }

    Ok(())
}

// ── public API ────────────────────────────────────────────

pub fn parse_config(contents: &str, origin: &Path) -> Result<Config, DeckError> {
    let config: Config = facet_toml::from_str(contents).map_err(|e| DeckError::ConfigParse {
        path: origin.display().to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the config file.
///
/// An explicit path must exist. Without one, the per-user default location is
/// tried and built-in defaults are used when nothing is there.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, DeckError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let default = paths::config_file();
            if !default.exists() {
                tracing::debug!(path = %default.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            default
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|source| DeckError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config = parse_config(&contents, &path)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}
