//! Configuration file loading.
//!
//! Reads a TOML config and validates it. A missing file falls back to the
//! defaults (usable for a local setup); a file that exists but cannot be
//! read or parsed is a hard error, never a silent fallback.

use std::path::Path;

use banter_types::config::BanterConfig;
use banter_types::error::ConfigError;

/// Load configuration from `path`.
pub async fn load_config(path: &Path) -> Result<BanterConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file found, using defaults");
            return Ok(BanterConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let config: BanterConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("banter.toml")).await.unwrap();
        assert_eq!(config.persona.ai_name, "banter");
        assert_eq!(config.prompt.history_lines, 20);
    }

    #[tokio::test]
    async fn valid_file_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("banter.toml");
        tokio::fs::write(
            &path,
            r#"
[persona]
ai_name = "Rosie"

[behavior]
wakewords = ["rosie"]

[textgen]
base_url = "http://10.0.0.5:5000/v1"
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.persona.ai_name, "Rosie");
        assert_eq!(config.behavior.wakewords, vec!["rosie"]);
        assert_eq!(config.textgen.base_url, "http://10.0.0.5:5000/v1");
    }

    #[tokio::test]
    async fn unparsable_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("banter.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("banter.toml");
        tokio::fs::write(
            &path,
            r#"
[[behavior.unsolicited_decay]]
threshold_seconds = 300
chance = 0.5

[[behavior.unsolicited_decay]]
threshold_seconds = 60
chance = 0.9
"#,
        )
        .await
        .unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::DecayTableNotAscending { .. }));
    }
}
