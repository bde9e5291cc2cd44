use rws_client::SessionConfig;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Root config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything `rws` reads from its TOML file.  Every table is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub serve: ServeConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reference server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "d_bind")]
    pub bind: String,
    /// Answer every handshake with `["denied"]`.
    #[serde(default)]
    pub deny: bool,
    /// Send `["bye"]` and drop each connection after this long.
    #[serde(default)]
    pub bye_after_ms: Option<u64>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: d_bind(),
            deny: false,
            bye_after_ms: None,
        }
    }
}

fn d_bind() -> String {
    "127.0.0.1:8765".into()
}

/// Load config from `RWS_CONFIG` (default `rws.toml`).  A missing file
/// yields the defaults.  Returns the config and the path it came from.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("RWS_CONFIG").unwrap_or_else(|_| "rws.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<Config> {
    let config: Config = if std::path::Path::new(config_path).exists() {
        let raw = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };
    config
        .session
        .validate()
        .map_err(|e| anyhow::anyhow!("{config_path}: {e}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from("/nonexistent/rws.toml").unwrap();
        assert_eq!(config.serve.bind, "127.0.0.1:8765");
        assert_eq!(config.session.open_timeout_ms, 16_000);
    }

    #[test]
    fn tables_are_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[session]
heartbeat_idle_ms = 4000

[session.backoff]
max_delay_ms = 9000

[serve]
deny = true
bye_after_ms = 1500
"#
        )
        .unwrap();

        let config = load_config_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.session.heartbeat_idle_ms, 4_000);
        assert_eq!(config.session.backoff.max_delay_ms, 9_000);
        assert!(config.serve.deny);
        assert_eq!(config.serve.bye_after_ms, Some(1_500));
        assert_eq!(config.serve.bind, "127.0.0.1:8765");
    }

    #[test]
    fn invalid_session_values_are_reported_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[session]\nopen_timeout_ms = 0\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = load_config_from(&path).unwrap_err().to_string();
        assert!(err.contains(&path), "{err}");
        assert!(err.contains("open_timeout_ms"), "{err}");
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(rendered.contains("[session]"));
        assert!(rendered.contains("[serve]"));
    }
}
