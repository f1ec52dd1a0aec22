//! Locates and parses `drydock.toml`.

use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::ConfigDiscovery;
use ortho_config::toml;
use serde::Deserialize;

use super::{ConfigError, ProviderConfig};

const APP_NAME: &str = "drydock";
const CONFIG_ENV_VAR: &str = "DRYDOCK_CONFIG_PATH";
const CONFIG_FILE_NAME: &str = "drydock.toml";
const DOTFILE_NAME: &str = ".drydock.toml";
const PROJECT_FILE_NAME: &str = "drydock.toml";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    google: ProviderConfig,
}

/// Discovery settings used to find `drydock.toml`.
#[must_use]
pub fn discovery() -> ConfigDiscovery {
    ConfigDiscovery::builder(APP_NAME)
        .env_var(CONFIG_ENV_VAR)
        .config_file_name(CONFIG_FILE_NAME)
        .dotfile_name(DOTFILE_NAME)
        .project_file_name(PROJECT_FILE_NAME)
        .build()
}

/// Reads the `[google]` table from the first existing discovery candidate.
///
/// A missing file yields the default (empty) configuration.
///
/// # Errors
///
/// Returns [`ConfigError`] when a candidate exists but cannot be read or
/// parsed.
pub fn load_provider_config(discovery: &ConfigDiscovery) -> Result<ProviderConfig, ConfigError> {
    for candidate in discovery.utf8_candidates() {
        if let Some(contents) = read_if_present(&candidate)? {
            tracing::debug!(path = %candidate, "loaded provider configuration");
            return parse_provider_config(&contents).map_err(|err| match err {
                ConfigError::Parse(message) => ConfigError::Parse(format!("{candidate}: {message}")),
                other => other,
            });
        }
    }
    Ok(ProviderConfig::default())
}

/// Parses the `[google]` table out of TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] when the text is not valid configuration.
pub fn parse_provider_config(contents: &str) -> Result<ProviderConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(ProviderConfig::default());
    }
    toml::from_str::<ConfigFile>(contents)
        .map(|file| file.google)
        .map_err(|err| ConfigError::Parse(err.to_string()))
}

fn read_if_present(path: &Utf8Path) -> Result<Option<String>, ConfigError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let Some(file_name) = path.file_name() else {
        return Ok(None);
    };

    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ConfigError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            });
        }
    };

    match dir.read_to_string(file_name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use super::*;

    fn discovery_for_root(root: &Utf8Path) -> ConfigDiscovery {
        ConfigDiscovery::builder(APP_NAME)
            .config_file_name(CONFIG_FILE_NAME)
            .dotfile_name(DOTFILE_NAME)
            .project_file_name(PROJECT_FILE_NAME)
            .clear_project_roots()
            .add_project_root(root)
            .build()
    }

    fn temp_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()))
    }

    #[test]
    fn parses_base_settings_and_zone_overrides() {
        let config = parse_provider_config(
            r#"
[google]
zone = "europe-west4-a"
project_id = "proj"
image_family = "debian-12"
tags = ["web"]

[google.metadata]
owner = "dev"

[google.zones."europe-west4-a"]
machine_type = "e2-medium"
preemptible = true

[[google.additional_disks]]
disk_size = 20
"#,
        )
        .unwrap_or_else(|err| panic!("parse: {err}"));

        assert_eq!(config.zone.as_deref(), Some("europe-west4-a"));
        assert_eq!(config.settings.project_id.as_deref(), Some("proj"));
        assert_eq!(config.settings.tags, vec![String::from("web")]);
        assert_eq!(
            config.settings.metadata.get("owner").map(String::as_str),
            Some("dev")
        );
        assert_eq!(config.settings.additional_disks.len(), 1);
        let zone = config
            .zones
            .get("europe-west4-a")
            .unwrap_or_else(|| panic!("zone override missing"));
        assert_eq!(zone.machine_type.as_deref(), Some("e2-medium"));
        assert_eq!(zone.preemptible, Some(true));
    }

    #[test]
    fn empty_text_is_default_configuration() {
        assert_eq!(parse_provider_config("  \n"), Ok(ProviderConfig::default()));
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let result = parse_provider_config("[google\nzone = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))), "{result:?}");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = temp_root(&tmp);

        let config = load_provider_config(&discovery_for_root(&root))
            .unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(config, ProviderConfig::default());
    }

    #[test]
    fn project_file_is_discovered() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = temp_root(&tmp);
        let dir = Dir::open_ambient_dir(&root, ambient_authority())
            .unwrap_or_else(|err| panic!("open temp dir: {err}"));
        dir.write(PROJECT_FILE_NAME, "[google]\nname = \"web\"\n")
            .unwrap_or_else(|err| panic!("write config: {err}"));

        let config = load_provider_config(&discovery_for_root(&root))
            .unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(config.settings.name.as_deref(), Some("web"));
    }
}
