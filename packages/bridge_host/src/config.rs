//! Layered configuration: struct defaults → `config.toml` → `BRIDGE_*` env
//! vars (double underscore = section nesting), figment-style exactly as the
//! teacher's own `config.rs`.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Named configuration presets, mirroring the teacher's `Profile` enum.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Bind 127.0.0.1, no tunnel auto-start.
    Local,
    /// Bind 127.0.0.1, tunnel auto-started, relay used for mobile reachability.
    Tunnel,
    /// Bind 0.0.0.0, durable-relay-backed deployment.
    Server,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    #[serde(default = "default_mdns_enabled")]
    pub mdns_enabled: bool,
    #[serde(default)]
    pub auto_start_tunnel: bool,
    #[serde(default = "default_pairing_ttl_seconds")]
    pub pairing_ttl_seconds: i64,
    #[serde(default = "default_access_ttl_seconds")]
    pub access_ttl_seconds: i64,
    #[serde(default = "default_refresh_ttl_seconds")]
    pub refresh_ttl_seconds: i64,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub jwt_refresh_secret: Option<String>,
    #[serde(default)]
    pub bind_host: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            profile: None,
            local_port: default_local_port(),
            relay_port: default_relay_port(),
            mdns_enabled: default_mdns_enabled(),
            auto_start_tunnel: false,
            pairing_ttl_seconds: default_pairing_ttl_seconds(),
            access_ttl_seconds: default_access_ttl_seconds(),
            refresh_ttl_seconds: default_refresh_ttl_seconds(),
            max_file_size_bytes: default_max_file_size_bytes(),
            cors_origins: Vec::new(),
            jwt_secret: None,
            jwt_refresh_secret: None,
            bind_host: None,
        }
    }
}

fn default_local_port() -> u16 {
    3002
}

fn default_relay_port() -> u16 {
    3004
}

fn default_mdns_enabled() -> bool {
    true
}

fn default_pairing_ttl_seconds() -> i64 {
    300
}

fn default_access_ttl_seconds() -> i64 {
    86_400
}

fn default_refresh_ttl_seconds() -> i64 {
    604_800
}

fn default_max_file_size_bytes() -> u64 {
    5 * 1024 * 1024
}

/// Load config from struct defaults, an optional profile layer, `config.toml`
/// under `data_dir`, then `BRIDGE_*` env vars.
///
/// Env vars use double-underscore for nesting, matching the teacher's
/// `CRAB_*` convention (e.g. `BRIDGE_LOCAL_PORT=3100`).
pub fn load_config(data_dir: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::Figment;
    use figment::providers::{Env, Format, Serialized, Toml};

    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("BRIDGE_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    let profile_layer = profile_to_file_config(profile.as_ref());

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_layer))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("BRIDGE_").split("__"))
}

fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    match profile {
        Some(Profile::Local) => FileConfig {
            profile: Some(Profile::Local),
            bind_host: Some("127.0.0.1".to_string()),
            auto_start_tunnel: false,
            ..Default::default()
        },
        Some(Profile::Tunnel) => FileConfig {
            profile: Some(Profile::Tunnel),
            bind_host: Some("127.0.0.1".to_string()),
            auto_start_tunnel: true,
            ..Default::default()
        },
        Some(Profile::Server) => FileConfig {
            profile: Some(Profile::Server),
            bind_host: Some("0.0.0.0".to_string()),
            auto_start_tunnel: false,
            ..Default::default()
        },
        None => FileConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_profile_binds_loopback() {
        let cfg = profile_to_file_config(Some(&Profile::Local));
        assert_eq!(cfg.bind_host.as_deref(), Some("127.0.0.1"));
        assert!(!cfg.auto_start_tunnel);
    }

    #[test]
    fn tunnel_profile_auto_starts() {
        let cfg = profile_to_file_config(Some(&Profile::Tunnel));
        assert!(cfg.auto_start_tunnel);
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = FileConfig::default();
        assert_eq!(cfg.local_port, 3002);
        assert_eq!(cfg.relay_port, 3004);
        assert_eq!(cfg.pairing_ttl_seconds, 300);
        assert_eq!(cfg.access_ttl_seconds, 86_400);
        assert_eq!(cfg.refresh_ttl_seconds, 604_800);
        assert_eq!(cfg.max_file_size_bytes, 5 * 1024 * 1024);
    }
}
