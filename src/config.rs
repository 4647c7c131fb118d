use std::fs;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::acquisition::Acquisition;
use crate::app::ImportRequest;
use crate::coordinates::{CoordinateSource, TomogramRef};
use crate::domain::{ItemKind, RunId, TransferMode};
use crate::error::TomoError;

pub const CONFIG_FILE: &str = "tomo-import.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub sampling_rate: Option<f64>,
    #[serde(default)]
    pub transfer: Option<TransferMode>,
    #[serde(default)]
    pub acquisition: Option<Acquisition>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ImportEntry {
    Shorthand(String),
    Detailed(ImportEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ImportEntryObject {
    pub pattern: String,
    #[serde(default)]
    pub files_path: Option<String>,
    #[serde(default)]
    pub kind: Option<ItemKind>,
    #[serde(default)]
    pub sampling_rate: Option<f64>,
    #[serde(default)]
    pub transfer: Option<TransferMode>,
    #[serde(default)]
    pub acquisition: Option<Acquisition>,
    #[serde(default)]
    pub coordinates: Option<Utf8PathBuf>,
    #[serde(default)]
    pub coordinates_run: Option<RunId>,
    #[serde(default)]
    pub box_size: Option<u32>,
    #[serde(default)]
    pub tomogram: Option<TomogramRef>,
    #[serde(default)]
    pub skip_imported: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub imports: Vec<ImportRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TomoError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => {
                let local = Utf8PathBuf::from(CONFIG_FILE);
                match user_config_path() {
                    Some(user) if !local.as_std_path().exists() && user.as_std_path().exists() => {
                        user
                    }
                    _ => local,
                }
            }
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(TomoError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| TomoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TomoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TomoError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let defaults = config.defaults;
        let base_acquisition = Acquisition::with_defaults()
            .overlay(&defaults.acquisition.clone().unwrap_or_default());

        let imports = config
            .imports
            .into_iter()
            .map(|entry| match entry {
                ImportEntry::Shorthand(pattern) => {
                    let sampling_rate = defaults.sampling_rate.ok_or_else(|| {
                        TomoError::ConfigParse(format!(
                            "import '{pattern}' needs a sampling_rate (none in defaults)"
                        ))
                    })?;
                    let mut request =
                        ImportRequest::from_pattern(ItemKind::Tomogram, None, &pattern, sampling_rate)?;
                    request.transfer = defaults.transfer.unwrap_or_default();
                    request.acquisition = base_acquisition.clone();
                    Ok(request)
                }
                ImportEntry::Detailed(obj) => {
                    let sampling_rate = obj
                        .sampling_rate
                        .or(defaults.sampling_rate)
                        .ok_or_else(|| {
                            TomoError::ConfigParse(format!(
                                "import '{}' needs a sampling_rate",
                                obj.pattern
                            ))
                        })?;
                    if obj.coordinates.is_some() && obj.coordinates_run.is_some() {
                        return Err(TomoError::ConfigParse(format!(
                            "import '{}' sets both coordinates and coordinates_run",
                            obj.pattern
                        )));
                    }
                    let mut request = ImportRequest::from_pattern(
                        obj.kind.unwrap_or(ItemKind::Tomogram),
                        obj.files_path.as_deref(),
                        &obj.pattern,
                        sampling_rate,
                    )?;
                    request.transfer = obj.transfer.or(defaults.transfer).unwrap_or_default();
                    request.acquisition =
                        base_acquisition.overlay(&obj.acquisition.unwrap_or_default());
                    request.coordinates = obj
                        .coordinates
                        .map(CoordinateSource::File)
                        .or(obj.coordinates_run.map(CoordinateSource::Run));
                    request.box_size = obj.box_size;
                    request.tomogram = obj.tomogram;
                    request.skip_imported = obj.skip_imported;
                    Ok(request)
                }
            })
            .collect::<Result<Vec<_>, TomoError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            imports,
        })
    }
}

fn user_config_path() -> Option<Utf8PathBuf> {
    BaseDirs::new().and_then(|dirs| {
        Utf8PathBuf::from_path_buf(dirs.config_dir().join("tomo-import").join("config.json")).ok()
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config: Config = serde_json::from_str(
            r#"{"defaults": {"sampling_rate": 2.5}, "imports": ["/data/*.mrc"]}"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.imports.len(), 1);
        assert_eq!(resolved.imports[0].kind, ItemKind::Tomogram);
        assert_eq!(resolved.imports[0].sampling_rate, 2.5);
        assert_eq!(resolved.imports[0].transfer, TransferMode::Link);
    }

    #[test]
    fn shorthand_without_sampling_rate_fails() {
        let config: Config = serde_json::from_str(r#"{"imports": ["/data/*.mrc"]}"#).unwrap();
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, TomoError::ConfigParse(_));
    }

    #[test]
    fn coordinates_entry_binds_box_and_tomogram() {
        let config: Config = serde_json::from_str(
            r#"{"imports": [{"pattern": "/data/*.txt", "kind": "coordinates",
                "sampling_rate": 1.0, "box_size": 48, "tomogram": "run-0002:3"}]}"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        let request = &resolved.imports[0];
        assert_eq!(request.kind, ItemKind::Coordinates);
        assert_eq!(request.box_size, Some(48));
        let tomogram = request.tomogram.unwrap();
        assert_eq!(tomogram.run, RunId::new(2));
        assert_eq!(tomogram.item, Some(3));
    }

    #[test]
    fn tilt_series_entry_uses_tagged_pattern() {
        let config: Config = serde_json::from_str(
            r#"{"defaults": {"sampling_rate": 1.5},
                "imports": [{"pattern": "/data/{TS}_{TO}_{TA}.mrc", "kind": "tilt-series"}]}"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.imports[0].kind, ItemKind::TiltSeries);
        assert_eq!(resolved.imports[0].pattern.as_str(), "/data/{TS}_{TO}_{TA}.mrc");
    }

    #[test]
    fn both_coordinate_sources_are_rejected() {
        let config: Config = serde_json::from_str(
            r#"{"imports": [{"pattern": "/data/*.mrc", "kind": "subtomogram", "sampling_rate": 1.0,
                "coordinates": "/data/coords.txt", "coordinates_run": "run-0001"}]}"#,
        )
        .unwrap();

        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, TomoError::ConfigParse(_));
    }
}
