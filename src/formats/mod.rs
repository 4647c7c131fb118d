mod em;
mod mrc;
mod spider;

use std::fmt;
use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::TomoError;

pub use mrc::MrcHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub n: u32,
}

impl Dimensions {
    pub fn new(x: u32, y: u32, z: u32, n: u32) -> Self {
        Self { x, y, z, n }
    }

    pub fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.x, self.y, self.z, self.n)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} x {}, {}", self.x, self.y, self.z, self.n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerFormat {
    Mrc,
    MrcStack,
    Spider,
    Em,
}

impl ContainerFormat {
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let ext = path.extension()?.to_ascii_lowercase();
        match ext.as_str() {
            "mrc" | "map" => Some(ContainerFormat::Mrc),
            "mrcs" | "st" | "ali" => Some(ContainerFormat::MrcStack),
            "spi" | "vol" | "stk" => Some(ContainerFormat::Spider),
            "em" => Some(ContainerFormat::Em),
            _ => None,
        }
    }

    pub fn read_header(self, path: &Utf8Path) -> Result<Dimensions, TomoError> {
        match self {
            ContainerFormat::Mrc | ContainerFormat::MrcStack => {
                let bytes = read_prefix(path, mrc::HEADER_LEN)?;
                let header = MrcHeader::parse(&bytes).map_err(|msg| metadata_err(path, msg))?;
                Ok(header.dimensions())
            }
            ContainerFormat::Spider => {
                let bytes = read_prefix(path, spider::HEADER_MIN_LEN)?;
                spider::parse(&bytes).map_err(|msg| metadata_err(path, msg))
            }
            ContainerFormat::Em => {
                let bytes = read_prefix(path, em::HEADER_LEN)?;
                em::parse(&bytes).map_err(|msg| metadata_err(path, msg))
            }
        }
    }

    pub fn interpret(self, header: Dimensions) -> Dimensions {
        match self {
            ContainerFormat::Mrc if header.z == 1 && header.n > 1 => Dimensions {
                z: header.n,
                n: 1,
                ..header
            },
            _ => header,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Mrc => write!(f, "mrc"),
            ContainerFormat::MrcStack => write!(f, "mrc-stack"),
            ContainerFormat::Spider => write!(f, "spider"),
            ContainerFormat::Em => write!(f, "em"),
        }
    }
}

pub trait HeaderReader {
    fn dimensions(&self, path: &Utf8Path) -> Result<(ContainerFormat, Dimensions), TomoError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerReader;

impl HeaderReader for ContainerReader {
    fn dimensions(&self, path: &Utf8Path) -> Result<(ContainerFormat, Dimensions), TomoError> {
        read_dimensions(path)
    }
}

pub fn read_dimensions(path: &Utf8Path) -> Result<(ContainerFormat, Dimensions), TomoError> {
    let format = ContainerFormat::from_path(path)
        .ok_or_else(|| TomoError::UnsupportedFormat(path.to_owned()))?;
    let header = format.read_header(path)?;
    Ok((format, format.interpret(header)))
}

fn read_prefix(path: &Utf8Path, len: usize) -> Result<Vec<u8>, TomoError> {
    let file = File::open(path.as_std_path()).map_err(|err| metadata_err(path, err.to_string()))?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|err| metadata_err(path, err.to_string()))?;
    if buf.len() < len {
        return Err(metadata_err(
            path,
            format!("header truncated ({} of {len} bytes)", buf.len()),
        ));
    }
    Ok(buf)
}

fn metadata_err(path: &Utf8Path, message: impl Into<String>) -> TomoError {
    TomoError::MetadataRead {
        path: path.to_owned(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) fn i32_at(self, bytes: &[u8], offset: usize) -> i32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        match self {
            Endian::Little => i32::from_le_bytes(word),
            Endian::Big => i32::from_be_bytes(word),
        }
    }

    pub(crate) fn f32_at(self, bytes: &[u8], offset: usize) -> f32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        match self {
            Endian::Little => f32::from_le_bytes(word),
            Endian::Big => f32::from_be_bytes(word),
        }
    }
}
