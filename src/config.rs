use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use ini::Ini;

/// Runtime-mutable subset of configuration: currently only the
/// announce interval, which the `update_announce_interval` control-plane
/// action can change without a restart.
pub struct Live {
    pub announce_interval: ArcSwap<u32>,
}

impl Live {
    pub fn new(announce_interval: u32) -> Live {
        Live {
            announce_interval: ArcSwap::from_pointee(announce_interval),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub listen_port: u16,
    pub max_connections: u32,
    pub announce_interval: u32,
    pub numwant_limit: usize,
    pub peers_timeout: i64,
    pub reap_peers_interval: u64,
    pub schedule_interval: u64,
    pub del_reason_lifetime: i64,
    pub mysql_url: String,
    pub site_host: String,
    pub site_password: String,
    pub readonly: bool,
}

impl Config {
    /// Parses the INI file at `path`, falling back to the defaults in the
    /// external-interfaces table for any absent key.
    pub fn from_file(path: &str) -> Result<Config> {
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("failed reading config file at {path}"))?;
        Ok(Config::from_ini(&ini))
    }

    fn from_ini(ini: &Ini) -> Config {
        let section = |name: &str| ini.section(Some(name));

        let get = |name: &str, key: &str| -> Option<String> {
            section(name).and_then(|s| s.get(key)).map(str::to_owned)
        };

        let get_or = |name: &str, key: &str, default: &str| -> String {
            get(name, key).unwrap_or_else(|| default.to_owned())
        };

        let parse_or = |name: &str, key: &str, default: u64| -> u64 {
            get(name, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Config {
            listen_port: parse_or("internal", "listen_port", 35000) as u16,
            max_connections: parse_or("internal", "max_connections", 1024) as u32,
            announce_interval: parse_or("tracker", "announce_interval", 1800) as u32,
            numwant_limit: parse_or("tracker", "numwant_limit", 50) as usize,
            peers_timeout: parse_or("timers", "peers_timeout", 7200) as i64,
            reap_peers_interval: parse_or("timers", "reap_peers_interval", 1800),
            schedule_interval: parse_or("timers", "schedule_interval", 3),
            del_reason_lifetime: parse_or("timers", "del_reason_lifetime", 86400) as i64,
            mysql_url: get_or("mysql", "url", ""),
            site_host: get_or("gazelle", "site_host", ""),
            site_password: get_or("gazelle", "site_password", ""),
            readonly: get("debug", "readonly")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::from_ini(&Ini::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_interfaces_table() {
        let config = Config::default();
        assert_eq!(config.listen_port, 35000);
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.announce_interval, 1800);
        assert_eq!(config.numwant_limit, 50);
        assert_eq!(config.peers_timeout, 7200);
        assert_eq!(config.reap_peers_interval, 1800);
        assert_eq!(config.schedule_interval, 3);
        assert_eq!(config.del_reason_lifetime, 86400);
        assert!(!config.readonly);
    }

    #[test]
    fn parses_overrides_from_ini_text() {
        let ini = Ini::load_from_str(
            "[internal]\nlisten_port=4000\n[debug]\nreadonly=true\n",
        )
        .unwrap();
        let config = Config::from_ini(&ini);
        assert_eq!(config.listen_port, 4000);
        assert!(config.readonly);
    }
}
