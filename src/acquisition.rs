use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::TomoError;

pub const DEFAULT_VOLTAGE: f64 = 300.0;
pub const DEFAULT_SPHERICAL_ABERRATION: f64 = 2.7;
pub const DEFAULT_AMPLITUDE_CONTRAST: f64 = 0.1;
pub const DEFAULT_MAGNIFICATION: f64 = 50000.0;

const SIDECAR_EXTENSION: &str = "acquisition.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Acquisition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(
        default,
        alias = "sphericalAberration",
        skip_serializing_if = "Option::is_none"
    )]
    pub spherical_aberration: Option<f64>,
    #[serde(
        default,
        alias = "amplitudeContrast",
        skip_serializing_if = "Option::is_none"
    )]
    pub amplitude_contrast: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnification: Option<f64>,
    #[serde(default, alias = "phaseFlipped", skip_serializing_if = "Option::is_none")]
    pub phase_flipped: Option<bool>,
    #[serde(default, alias = "doseInitial", skip_serializing_if = "Option::is_none")]
    pub dose_initial: Option<f64>,
    #[serde(default, alias = "dosePerFrame", skip_serializing_if = "Option::is_none")]
    pub dose_per_frame: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Acquisition {
    pub fn with_defaults() -> Self {
        Self {
            voltage: Some(DEFAULT_VOLTAGE),
            spherical_aberration: Some(DEFAULT_SPHERICAL_ABERRATION),
            amplitude_contrast: Some(DEFAULT_AMPLITUDE_CONTRAST),
            magnification: Some(DEFAULT_MAGNIFICATION),
            phase_flipped: Some(false),
            dose_initial: None,
            dose_per_frame: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_none()
            && self.spherical_aberration.is_none()
            && self.amplitude_contrast.is_none()
            && self.magnification.is_none()
            && self.phase_flipped.is_none()
            && self.dose_initial.is_none()
            && self.dose_per_frame.is_none()
            && self.extra.is_empty()
    }

    pub fn overlay(&self, other: &Acquisition) -> Acquisition {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        Acquisition {
            voltage: other.voltage.or(self.voltage),
            spherical_aberration: other.spherical_aberration.or(self.spherical_aberration),
            amplitude_contrast: other.amplitude_contrast.or(self.amplitude_contrast),
            magnification: other.magnification.or(self.magnification),
            phase_flipped: other.phase_flipped.or(self.phase_flipped),
            dose_initial: other.dose_initial.or(self.dose_initial),
            dose_per_frame: other.dose_per_frame.or(self.dose_per_frame),
            extra,
        }
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = self.voltage {
            parts.push(format!("voltage {v} kV"));
        }
        if let Some(cs) = self.spherical_aberration {
            parts.push(format!("Cs {cs} mm"));
        }
        if let Some(q0) = self.amplitude_contrast {
            parts.push(format!("amplitude contrast {q0:.2}"));
        }
        if let Some(mag) = self.magnification {
            parts.push(format!("magnification {mag}"));
        }
        if self.phase_flipped == Some(true) {
            parts.push("phase flipped".to_string());
        }
        if let Some(dose) = self.dose_initial {
            parts.push(format!("initial dose {dose} e/Å²"));
        }
        if let Some(dose) = self.dose_per_frame {
            parts.push(format!("dose per frame {dose} e/Å²"));
        }
        if !self.extra.is_empty() {
            parts.push(format!("{} extra fields", self.extra.len()));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        }
    }
}

pub fn sidecar_path(source: &Utf8Path) -> Utf8PathBuf {
    source.with_extension(SIDECAR_EXTENSION)
}

pub fn is_sidecar(path: &Utf8Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.ends_with(&format!(".{SIDECAR_EXTENSION}")))
}

pub fn extract_for(source: &Utf8Path, run_level: &Acquisition) -> Result<Acquisition, TomoError> {
    let sidecar = sidecar_path(source);
    if !sidecar.as_std_path().is_file() {
        return Ok(run_level.clone());
    }
    let content = fs::read_to_string(sidecar.as_std_path()).map_err(|err| {
        TomoError::MetadataRead {
            path: sidecar.clone(),
            message: err.to_string(),
        }
    })?;
    let from_file: Acquisition =
        serde_json::from_str(&content).map_err(|err| TomoError::MetadataRead {
            path: sidecar.clone(),
            message: err.to_string(),
        })?;
    tracing::debug!("acquisition sidecar {sidecar} applied");
    Ok(run_level.overlay(&from_file))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn sidecar_sits_next_to_source() {
        let path = sidecar_path(Utf8Path::new("/data/tomo_01.mrc"));
        assert_eq!(path, Utf8Path::new("/data/tomo_01.acquisition.json"));
    }

    #[test]
    fn sidecar_names_are_recognized() {
        assert!(is_sidecar(Utf8Path::new("/data/tomo_01.acquisition.json")));
        assert!(!is_sidecar(Utf8Path::new("/data/tomo_01.mrc")));
        assert!(!is_sidecar(Utf8Path::new("/data/acquisition.json")));
    }

    #[test]
    fn sidecar_overrides_and_keeps_unknown_fields() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = dir.join("t.mrc");
        fs::write(
            sidecar_path(&source).as_std_path(),
            r#"{"voltage": 200, "sphericalAberration": 0.01, "dosePerTilt": 3.5}"#,
        )
        .unwrap();

        let acq = extract_for(&source, &Acquisition::with_defaults()).unwrap();
        assert_eq!(acq.voltage, Some(200.0));
        assert_eq!(acq.spherical_aberration, Some(0.01));
        assert_eq!(acq.amplitude_contrast, Some(DEFAULT_AMPLITUDE_CONTRAST));
        assert_eq!(acq.extra["dosePerTilt"], serde_json::json!(3.5));
    }

    #[test]
    fn malformed_sidecar_is_metadata_error() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = dir.join("t.mrc");
        fs::write(sidecar_path(&source).as_std_path(), "{ nope").unwrap();
        let err = extract_for(&source, &Acquisition::default()).unwrap_err();
        assert_matches!(err, TomoError::MetadataRead { .. });
    }

    #[test]
    fn movie_dose_overlays_and_describes() {
        let dose = Acquisition {
            dose_initial: Some(0.0),
            dose_per_frame: Some(1.5),
            ..Acquisition::default()
        };
        let acq = Acquisition::with_defaults().overlay(&dose);
        assert_eq!(acq.dose_per_frame, Some(1.5));
        assert!(acq.describe().ends_with("initial dose 0 e/Å², dose per frame 1.5 e/Å²"));
    }

    #[test]
    fn no_sidecar_returns_run_level() {
        let acq = extract_for(Utf8Path::new("/nonexistent/x.mrc"), &Acquisition::default()).unwrap();
        assert!(acq.is_empty());
    }
}
