use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::dataset::{FileLocation, ItemId};
use crate::domain::RunId;
use crate::error::TomoError;
use crate::formats::Dimensions;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn parse(text: &str) -> Result<Vec<Coordinate3D>, TomoError> {
    let mut coords = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let values = trimmed
            .split_whitespace()
            .map(|field| field.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| TomoError::CoordinatesParse {
                line: index + 1,
                message: err.to_string(),
            })?;
        let &[x, y, z] = values.as_slice() else {
            return Err(TomoError::CoordinatesParse {
                line: index + 1,
                message: format!("expected 3 values, found {}", values.len()),
            });
        };
        coords.push(Coordinate3D { x, y, z });
    }
    Ok(coords)
}

pub fn load(path: &Utf8Path) -> Result<Vec<Coordinate3D>, TomoError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| TomoError::Filesystem(format!("read {path}: {err}")))?;
    parse(&content).map_err(|err| match err {
        TomoError::CoordinatesParse { line, message } => TomoError::CoordinatesParse {
            line,
            message: format!("{path}: {message}"),
        },
        other => other,
    })
}

#[derive(Debug, Clone)]
pub struct CoordinateQueue {
    total: usize,
    pending: VecDeque<Coordinate3D>,
}

impl CoordinateQueue {
    pub fn new(coords: Vec<Coordinate3D>) -> Self {
        Self {
            total: coords.len(),
            pending: coords.into(),
        }
    }

    pub fn take_next(&mut self) -> Result<Coordinate3D, TomoError> {
        self.pending
            .pop_front()
            .ok_or(TomoError::CoordinateMismatch(self.total))
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinateSource {
    File(Utf8PathBuf),
    Run(RunId),
}

impl fmt::Display for CoordinateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSource::File(path) => write!(f, "{path}"),
            CoordinateSource::Run(run) => write!(f, "{run}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TomogramRef {
    pub run: RunId,
    pub item: Option<u64>,
}

impl fmt::Display for TomogramRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item {
            Some(item) => write!(f, "{}:{item}", self.run),
            None => write!(f, "{}", self.run),
        }
    }
}

impl FromStr for TomogramRef {
    type Err = TomoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (run, item) = match value.trim().split_once(':') {
            Some((run, item)) => {
                let item = item
                    .parse::<u64>()
                    .map_err(|_| TomoError::RunNotFound(value.to_string()))?;
                (run, Some(item))
            }
            None => (value.trim(), None),
        };
        Ok(Self {
            run: run.parse()?,
            item,
        })
    }
}

impl TryFrom<String> for TomogramRef {
    type Error = TomoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TomogramRef> for String {
    fn from(value: TomogramRef) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundTomogram {
    pub reference: TomogramRef,
    pub item: ItemId,
    pub location: FileLocation,
    pub dimensions: Dimensions,
}

impl BoundTomogram {
    pub fn contains(&self, coord: &Coordinate3D) -> bool {
        let inside = |value: f64, size: u32| (0.0..=f64::from(size)).contains(&value);
        inside(coord.x, self.dimensions.x)
            && inside(coord.y, self.dimensions.y)
            && inside(coord.z, self.dimensions.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedCoordinate {
    pub id: ItemId,
    pub position: Coordinate3D,
    pub source: Utf8PathBuf,
    pub source_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSet {
    box_size: u32,
    sampling_rate: f64,
    tomogram: BoundTomogram,
    coordinates: Vec<ImportedCoordinate>,
}

impl CoordinateSet {
    pub fn new(box_size: u32, sampling_rate: f64, tomogram: BoundTomogram) -> Result<Self, TomoError> {
        if box_size == 0 {
            return Err(TomoError::InvalidBoxSize(box_size));
        }
        Ok(Self {
            box_size,
            sampling_rate,
            tomogram,
            coordinates: Vec::new(),
        })
    }

    pub fn box_size(&self) -> u32 {
        self.box_size
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn tomogram(&self) -> &BoundTomogram {
        &self.tomogram
    }

    pub fn coordinates(&self) -> &[ImportedCoordinate] {
        &self.coordinates
    }

    pub fn size(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn positions(&self) -> Vec<Coordinate3D> {
        self.coordinates.iter().map(|coord| coord.position).collect()
    }

    pub fn append(&mut self, position: Coordinate3D, source: &Utf8Path, source_id: u64) -> ItemId {
        let id = ItemId::after(self.coordinates.last().map(|coord| coord.id));
        self.coordinates.push(ImportedCoordinate {
            id,
            position,
            source: source.to_owned(),
            source_id,
        });
        id
    }
}
