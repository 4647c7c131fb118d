use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TomoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Tomogram,
    SubTomogram,
    #[serde(rename = "tilt-series")]
    TiltSeries,
    #[serde(rename = "tilt-series-movies")]
    TiltSeriesMovies,
    Coordinates,
}

impl ItemKind {
    pub fn plural_label(self) -> &'static str {
        match self {
            ItemKind::Tomogram => "Tomograms",
            ItemKind::SubTomogram => "SubTomograms",
            ItemKind::TiltSeries => "TiltSeries",
            ItemKind::TiltSeriesMovies => "TiltSeriesM",
            ItemKind::Coordinates => "Coordinates",
        }
    }

    pub fn singular_label(self) -> &'static str {
        match self {
            ItemKind::Tomogram => "Tomogram",
            ItemKind::SubTomogram => "SubTomogram",
            ItemKind::TiltSeries => "TiltSeries",
            ItemKind::TiltSeriesMovies => "TiltSeriesM",
            ItemKind::Coordinates => "Coordinate",
        }
    }

    pub fn protocol_label(self) -> &'static str {
        match self {
            ItemKind::Tomogram => "import tomograms",
            ItemKind::SubTomogram => "import subtomograms",
            ItemKind::TiltSeries | ItemKind::TiltSeriesMovies => "import tilt-series",
            ItemKind::Coordinates => "import set of coordinates 3D",
        }
    }

    pub fn output_names(self) -> OutputNames {
        match self {
            ItemKind::Tomogram => OutputNames {
                single: Some("outputTomogram"),
                collection: "outputTomograms",
            },
            ItemKind::SubTomogram => OutputNames {
                single: None,
                collection: "outputSubTomograms",
            },
            ItemKind::TiltSeries => OutputNames {
                single: None,
                collection: "outputTiltSeries",
            },
            ItemKind::TiltSeriesMovies => OutputNames {
                single: None,
                collection: "outputTiltSeriesM",
            },
            ItemKind::Coordinates => OutputNames {
                single: None,
                collection: "outputCoordinates",
            },
        }
    }

    pub fn is_volume(self) -> bool {
        matches!(self, ItemKind::Tomogram | ItemKind::SubTomogram)
    }

    pub fn is_tilt_series(self) -> bool {
        matches!(self, ItemKind::TiltSeries | ItemKind::TiltSeriesMovies)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Tomogram => write!(f, "tomogram"),
            ItemKind::SubTomogram => write!(f, "subtomogram"),
            ItemKind::TiltSeries => write!(f, "tilt-series"),
            ItemKind::TiltSeriesMovies => write!(f, "tilt-series-movies"),
            ItemKind::Coordinates => write!(f, "coordinates"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputNames {
    pub single: Option<&'static str>,
    pub collection: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Link,
    Symlink,
    Copy,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Link => write!(f, "link"),
            TransferMode::Symlink => write!(f, "symlink"),
            TransferMode::Copy => write!(f, "copy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(u32);

impl RunId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{:04}", self.0)
    }
}

impl FromStr for RunId {
    type Err = TomoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix("run-").unwrap_or(trimmed);
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(TomoError::RunNotFound(value.to_string()));
        }
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| TomoError::RunNotFound(value.to_string()))
    }
}

impl TryFrom<String> for RunId {
    type Error = TomoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(value: RunId) -> Self {
        value.to_string()
    }
}
