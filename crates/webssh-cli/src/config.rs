//! Settings from the config file, environment and flags.

use crate::cli::Cli;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use webssh_client::{ClientConfig, Target, TransferClient};

/// Used when neither the flags nor the config file set a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Contents of the `--config` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub prefix: Option<String>,
    pub target: Option<String>,
    pub target_label: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

/// Effective settings. Flags and environment win over the file.
#[derive(Debug)]
pub struct Settings {
    pub url: String,
    pub prefix: String,
    pub target: Option<Target>,
    pub timeout: Duration,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        let url = cli
            .url
            .clone()
            .or(file.url)
            .context("no server URL; pass --url or set WEBSSH_URL")?;
        let label = cli.label.clone().or(file.target_label);
        let target = cli.target.clone().or(file.target).map(|raw| match label {
            Some(label) => Target::labeled(raw, label),
            None => Target::new(raw),
        });

        Ok(Self {
            url,
            prefix: cli.prefix.clone().or(file.prefix).unwrap_or_default(),
            target,
            timeout: cli
                .timeout
                .or(file.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    pub fn client(&self) -> anyhow::Result<TransferClient> {
        let config = ClientConfig::new(&self.url)?
            .with_prefix(&self.prefix)
            .with_timeout(self.timeout);
        Ok(TransferClient::connect(config)?)
    }

    pub fn target(&self) -> anyhow::Result<&Target> {
        self.target
            .as_ref()
            .context("no target; pass --target or set WEBSSH_TARGET")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["webssh-transfer"];
        argv.extend_from_slice(args);
        argv.push("check");
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn file_values_fill_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webssh.toml");
        std::fs::write(
            &path,
            r#"
                url = "http://files.internal:8080"
                prefix = "webssh"
                target = "opaque"
                target_label = "staging"
                timeout_secs = 5
            "#,
        )
        .unwrap();

        let file = FileConfig::load(&path).unwrap();
        let settings = Settings::resolve(&cli(&["--timeout", "9"]), file).unwrap();

        assert_eq!(settings.url, "http://files.internal:8080");
        assert_eq!(settings.prefix, "webssh");
        assert_eq!(settings.timeout, Duration::from_secs(9));
        let target = settings.target().unwrap();
        assert_eq!(target.as_raw(), "opaque");
        assert_eq!(target.to_string(), "staging");
    }

    #[test]
    fn flags_win_and_defaults_apply() {
        let file = FileConfig {
            url: Some("http://a".to_string()),
            ..FileConfig::default()
        };
        let settings =
            Settings::resolve(&cli(&["--url", "http://b", "--target", "box"]), file).unwrap();
        assert_eq!(settings.url, "http://b");
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert!(settings.client().is_ok());
    }

    #[test]
    fn missing_url_and_target_are_reported() {
        let err = Settings::resolve(&cli(&[]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--url"));

        let settings =
            Settings::resolve(&cli(&["--url", "http://b"]), FileConfig::default()).unwrap();
        assert!(settings.target().unwrap_err().to_string().contains("--target"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "server = \"x\"\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
