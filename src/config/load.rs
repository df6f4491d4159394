use std::path::{Path, PathBuf};

use tracing::info;

use crate::app_dirs;

use super::save::save_to_path;
use super::types::AppSettings;
use super::{CONFIG_FILE_NAME, ConfigError, map_app_dir_error};

/// Resolve the settings file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load settings from the app directory, returning defaults if the file is missing.
pub fn load_or_default() -> Result<AppSettings, ConfigError> {
    load_from_path(&config_path()?)
}

/// Load settings from the app directory, writing the defaults on first run so the polarity in
/// use is visible and editable.
pub fn load_or_create() -> Result<AppSettings, ConfigError> {
    let path = config_path()?;
    if path.exists() {
        return load_from_path(&path);
    }
    let settings = AppSettings::default();
    save_to_path(&settings, &path)?;
    info!(
        path = %path.display(),
        polarity = %settings.pipeline.polarity,
        "Wrote default settings"
    );
    Ok(settings)
}

/// Load settings from a specific file; a missing file yields defaults.
///
/// An existing file must name `[pipeline] polarity` explicitly.
pub fn load_from_path(path: &Path) -> Result<AppSettings, ConfigError> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    };
    let table: toml::Table = toml::from_str(&text).map_err(parse_error)?;
    let has_polarity = table
        .get("pipeline")
        .and_then(|pipeline| pipeline.get("polarity"))
        .is_some();
    if !has_polarity {
        return Err(ConfigError::MissingPolarity {
            path: path.to_path_buf(),
        });
    }
    toml::Value::Table(table).try_into().map_err(parse_error)
}
