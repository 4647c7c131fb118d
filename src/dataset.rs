use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::acquisition::Acquisition;
use crate::coordinates::{Coordinate3D, CoordinateSet};
use crate::domain::ItemKind;
use crate::error::TomoError;
use crate::formats::{ContainerFormat, Dimensions};
use crate::geometry::Origin;
use crate::tilt_series::TiltSeriesSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn after(previous: Option<ItemId>) -> Self {
        Self(previous.map(|id| id.0 + 1).unwrap_or(1))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: Utf8PathBuf,
    pub id: u64,
    pub format: ContainerFormat,
    pub dimensions: Dimensions,
}

impl SourceFile {
    pub fn multiplicity(&self) -> u32 {
        self.dimensions.n.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    pub path: Utf8PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl FileLocation {
    pub fn file(path: Utf8PathBuf) -> Self {
        Self { path, index: None }
    }

    pub fn indexed(path: Utf8PathBuf, index: u32) -> Self {
        Self {
            path,
            index: Some(index),
        }
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{index}@{}", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub kind: ItemKind,
    pub sampling_rate: f64,
    pub location: FileLocation,
    pub source: Utf8PathBuf,
    pub source_id: u64,
    pub dimensions: Dimensions,
    pub acquisition: Acquisition,
    pub origin: Origin,
    pub coordinate: Option<Coordinate3D>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub sampling_rate: f64,
    pub location: FileLocation,
    pub source: Utf8PathBuf,
    pub source_id: u64,
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Acquisition::is_empty")]
    pub acquisition: Acquisition,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate3D>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedCollection {
    kind: ItemKind,
    sampling_rate: f64,
    items: Vec<ImportedItem>,
}

impl ImportedCollection {
    pub fn new(kind: ItemKind, sampling_rate: f64) -> Self {
        Self {
            kind,
            sampling_rate,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ImportedItem] {
        &self.items
    }

    pub fn append(&mut self, draft: ItemDraft) -> Result<ItemId, TomoError> {
        if !draft.location.path.as_std_path().is_file() {
            return Err(TomoError::Filesystem(format!(
                "item file does not exist: {}",
                draft.location.path
            )));
        }
        let id = ItemId::after(self.items.last().map(|item| item.id));
        self.items.push(ImportedItem {
            id,
            kind: draft.kind,
            sampling_rate: draft.sampling_rate,
            location: draft.location,
            source: draft.source,
            source_id: draft.source_id,
            dimensions: draft.dimensions,
            acquisition: draft.acquisition,
            origin: draft.origin,
            coordinate: draft.coordinate,
        });
        Ok(id)
    }

    pub fn into_output(mut self) -> Option<ImportOutput> {
        let names = self.kind.output_names();
        match (self.items.len(), names.single) {
            (0, _) => None,
            (1, Some(single)) => self.items.pop().map(|item| ImportOutput::Single {
                name: single.to_string(),
                item,
            }),
            _ => Some(ImportOutput::Collection {
                name: names.collection.to_string(),
                collection: self,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum ImportOutput {
    Single {
        name: String,
        item: ImportedItem,
    },
    Collection {
        name: String,
        collection: ImportedCollection,
    },
    TiltSeries {
        name: String,
        set: TiltSeriesSet,
    },
    Coordinates {
        name: String,
        set: CoordinateSet,
    },
}

impl ImportOutput {
    pub fn tilt_series(set: TiltSeriesSet) -> Option<Self> {
        if set.is_empty() {
            return None;
        }
        Some(ImportOutput::TiltSeries {
            name: set.kind().output_names().collection.to_string(),
            set,
        })
    }

    pub fn coordinates(set: CoordinateSet) -> Option<Self> {
        if set.is_empty() {
            return None;
        }
        Some(ImportOutput::Coordinates {
            name: ItemKind::Coordinates.output_names().collection.to_string(),
            set,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ImportOutput::Single { name, .. }
            | ImportOutput::Collection { name, .. }
            | ImportOutput::TiltSeries { name, .. }
            | ImportOutput::Coordinates { name, .. } => name,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, ImportOutput::Single { .. })
    }

    pub fn size(&self) -> usize {
        match self {
            ImportOutput::Single { .. } => 1,
            ImportOutput::Collection { collection, .. } => collection.size(),
            ImportOutput::TiltSeries { set, .. } => set.size(),
            ImportOutput::Coordinates { set, .. } => set.size(),
        }
    }

    pub fn items(&self) -> &[ImportedItem] {
        match self {
            ImportOutput::Single { item, .. } => std::slice::from_ref(item),
            ImportOutput::Collection { collection, .. } => collection.items(),
            ImportOutput::TiltSeries { .. } | ImportOutput::Coordinates { .. } => &[],
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        match self {
            ImportOutput::Single { item, .. } => item.sampling_rate,
            ImportOutput::Collection { collection, .. } => collection.sampling_rate(),
            ImportOutput::TiltSeries { set, .. } => set.sampling_rate(),
            ImportOutput::Coordinates { set, .. } => set.sampling_rate(),
        }
    }

    pub fn sources(&self) -> Vec<&Utf8Path> {
        match self {
            ImportOutput::Single { .. } | ImportOutput::Collection { .. } => {
                self.items().iter().map(|item| item.source.as_path()).collect()
            }
            ImportOutput::TiltSeries { set, .. } => set
                .series()
                .iter()
                .flat_map(|series| series.images.iter().map(|image| image.source.as_path()))
                .collect(),
            ImportOutput::Coordinates { set, .. } => set
                .coordinates()
                .iter()
                .map(|coord| coord.source.as_path())
                .collect(),
        }
    }
}
