use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::acquisition::Acquisition;
use crate::dataset::{FileLocation, ItemId};
use crate::domain::ItemKind;
use crate::error::TomoError;
use crate::formats::Dimensions;
use crate::pattern::{self, FilePattern, MatchedFile};

const TS_TAG: &str = "{TS}";
const TO_TAG: &str = "{TO}";
const TA_TAG: &str = "{TA}";
const ANGLES_EXTENSION: &str = "tlt";

#[derive(Debug, Clone)]
pub struct TiltSeriesPattern {
    raw: String,
    files: FilePattern,
    regex: Regex,
    angles_in_pattern: bool,
}

impl TiltSeriesPattern {
    pub fn new(pattern: &str) -> Result<Self, TomoError> {
        Self::with_dir(None, pattern)
    }

    pub fn with_dir(files_path: Option<&str>, pattern: &str) -> Result<Self, TomoError> {
        let (raw, absolute) = pattern::expand(files_path, pattern)?;
        let absolute = absolute.as_str();
        if !absolute.contains(TS_TAG) {
            return Err(TomoError::InvalidPattern(format!(
                "{raw}: the pattern needs a {TS_TAG} tag"
            )));
        }
        let has_order = absolute.contains(TO_TAG);
        let has_angle = absolute.contains(TA_TAG);
        if has_order != has_angle {
            return Err(TomoError::InvalidPattern(format!(
                "{raw}: {TA_TAG} and {TO_TAG} should both be in the files pattern"
            )));
        }

        let glob = absolute
            .replace(TS_TAG, "*")
            .replace(TO_TAG, "*")
            .replace(TA_TAG, "*");
        let files = FilePattern::new(&glob)?;
        let (regex_src, _) = pattern::translate(
            absolute,
            &raw,
            &[
                (TS_TAG, "(?P<ts>[^/]+)"),
                (TO_TAG, "(?P<to>[0-9]+)"),
                (TA_TAG, r"(?P<ta>[+-]?[0-9]+(?:\.[0-9]+)?)"),
            ],
        )?;
        let regex = Regex::new(&regex_src).map_err(|err| TomoError::InvalidPattern(err.to_string()))?;

        Ok(Self {
            raw,
            files,
            regex,
            angles_in_pattern: has_order && has_angle,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn file_pattern(&self) -> &FilePattern {
        &self.files
    }

    pub fn angles_in_pattern(&self) -> bool {
        self.angles_in_pattern
    }

    pub fn group(&self, files: impl IntoIterator<Item = MatchedFile>) -> Result<Vec<SeriesFiles>, TomoError> {
        let mut groups: Vec<SeriesFiles> = Vec::new();
        for matched in files {
            if is_angle_file(&matched.path) {
                continue;
            }
            let Some(captures) = self.regex.captures(matched.path.as_str()) else {
                tracing::debug!("{} does not match {}", matched.path, self.raw);
                continue;
            };
            let Some(ts_id) = captures.name("ts").map(|ts| ts.as_str().to_string()) else {
                continue;
            };
            let tilt = match (captures.name("to"), captures.name("ta")) {
                (Some(order), Some(angle)) => Some(PatternTilt {
                    acquisition_order: order.as_str().parse().map_err(|_| {
                        TomoError::InvalidPattern(format!(
                            "acquisition order out of range in {}",
                            matched.path
                        ))
                    })?,
                    tilt_angle: angle.as_str().parse().map_err(|_| {
                        TomoError::InvalidPattern(format!("invalid tilt angle in {}", matched.path))
                    })?,
                }),
                _ => None,
            };
            let file = SeriesFile {
                path: matched.path,
                tilt,
            };
            match groups.iter_mut().find(|group| group.ts_id == ts_id) {
                Some(group) => group.files.push(file),
                None => groups.push(SeriesFiles {
                    ts_id,
                    files: vec![file],
                }),
            }
        }
        Ok(groups)
    }

    pub fn resolve(&self) -> Result<Vec<SeriesFiles>, TomoError> {
        self.group(self.files.resolve()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternTilt {
    pub acquisition_order: u32,
    pub tilt_angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFile {
    pub path: Utf8PathBuf,
    pub tilt: Option<PatternTilt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFiles {
    pub ts_id: String,
    pub files: Vec<SeriesFile>,
}

impl SeriesFiles {
    pub fn paths(&self) -> impl Iterator<Item = &Utf8Path> {
        self.files.iter().map(|file| file.path.as_path())
    }
}

pub fn is_angle_file(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ANGLES_EXTENSION))
}

pub fn angles_path(stack: &Utf8Path) -> Utf8PathBuf {
    stack.with_extension(ANGLES_EXTENSION)
}

pub fn parse_angles(path: &Utf8Path, text: &str) -> Result<Vec<f64>, TomoError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<f64>().map_err(|err| TomoError::TiltAngles {
                path: path.to_owned(),
                message: format!("'{line}': {err}"),
            })
        })
        .collect()
}

pub fn load_angles(stack: &Utf8Path) -> Result<Vec<f64>, TomoError> {
    let path = angles_path(stack);
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| TomoError::TiltAngles {
        path: path.clone(),
        message: err.to_string(),
    })?;
    parse_angles(&path, &content)
}

pub fn image_count(dims: &Dimensions) -> u32 {
    if dims.n > 1 { dims.n } else { dims.z.max(1) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiltImage {
    pub location: FileLocation,
    pub source: Utf8PathBuf,
    pub acquisition_order: u32,
    pub tilt_angle: f64,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiltSeries {
    pub id: ItemId,
    pub ts_id: String,
    pub images: Vec<TiltImage>,
}

impl TiltSeries {
    pub fn angle_range(&self) -> Option<(f64, f64)> {
        self.images.iter().map(|image| image.tilt_angle).fold(None, |range, angle| {
            Some(match range {
                Some((low, high)) => (f64::min(low, angle), f64::max(high, angle)),
                None => (angle, angle),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiltSeriesSet {
    kind: ItemKind,
    sampling_rate: f64,
    #[serde(default, skip_serializing_if = "Acquisition::is_empty")]
    acquisition: Acquisition,
    series: Vec<TiltSeries>,
}

impl TiltSeriesSet {
    pub fn new(kind: ItemKind, sampling_rate: f64, acquisition: Acquisition) -> Self {
        Self {
            kind,
            sampling_rate,
            acquisition,
            series: Vec::new(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn series(&self) -> &[TiltSeries] {
        &self.series
    }

    pub fn size(&self) -> usize {
        self.series.len()
    }

    pub fn image_total(&self) -> usize {
        self.series.iter().map(|series| series.images.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn append(&mut self, ts_id: String, mut images: Vec<TiltImage>) -> Result<ItemId, TomoError> {
        if let Some(missing) = images
            .iter()
            .find(|image| !image.location.path.as_std_path().is_file())
        {
            return Err(TomoError::Filesystem(format!(
                "tilt image file does not exist: {}",
                missing.location.path
            )));
        }
        images.sort_by_key(|image| image.acquisition_order);
        let id = ItemId::after(self.series.last().map(|series| series.id));
        self.series.push(TiltSeries { id, ts_id, images });
        Ok(id)
    }
}
