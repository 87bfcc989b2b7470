//! Loading [`ExtractConfig`] from TOML.

use std::path::Path;

use osm_extract_pipeline_models::ExtractConfig;

use crate::ExtractError;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "osm_extract.toml";

/// Loads the configuration.
///
/// With `explicit`, that file must exist. Without it, [`DEFAULT_CONFIG_FILE`]
/// is used if present and built-in defaults otherwise.
///
/// # Errors
///
/// Returns [`ExtractError::Io`] if a config file cannot be read, or
/// [`ExtractError::Config`] if it is not valid.
pub fn load_config(explicit: Option<&Path>) -> Result<ExtractConfig, ExtractError> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
            return Ok(ExtractConfig::default());
        }
        Err(e) => {
            return Err(ExtractError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    log::info!("Loaded config from {}", path.display());
    parse_config(path, &text)
}

/// Parses TOML config text; `path` is only used for messages.
///
/// # Errors
///
/// Returns [`ExtractError::Config`] on invalid TOML or unknown keys.
pub fn parse_config(path: &Path, text: &str) -> Result<ExtractConfig, ExtractError> {
    toml::from_str(text).map_err(|e| ExtractError::Config {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    #[test]
    fn parses_overrides() {
        let config = parse_config(
            Path::new("osm_extract.toml"),
            r#"
                input_dir = "boundaries"
                manifest_path = "provenance.json"
                osmium_bin = "/opt/osmium/bin/osmium"
            "#,
        )
        .unwrap();
        assert_eq!(config.input_dir, PathBuf::from("boundaries"));
        assert_eq!(config.manifest_path(), PathBuf::from("provenance.json"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_config(Path::new("osm_extract.toml"), "inptu_dir = \"x\"\n").unwrap_err();
        assert!(matches!(err, ExtractError::Config { .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(ExtractError::Io { .. })
        ));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "cache_dir = \"pbf_cache\"\n").unwrap();
        assert_eq!(
            load_config(Some(&path)).unwrap().cache_dir,
            PathBuf::from("pbf_cache")
        );
    }
}
