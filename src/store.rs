use std::collections::HashSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::dataset::ImportOutput;
use crate::domain::{ItemKind, RunId, TransferMode};
use crate::error::TomoError;
use crate::pattern::canonical_or_self;

const PROJECT_DIR: &str = ".tomo-import";
const MANIFEST_FILE: &str = "run.json";

#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, TomoError> {
        let cwd = std::env::current_dir().map_err(|err| TomoError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(PROJECT_DIR))
            .map_err(|_| TomoError::Filesystem("invalid project path".to_string()))?;
        Ok(Self { project_root })
    }

    pub fn new_with_root(project_root: Utf8PathBuf) -> Self {
        Self { project_root }
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn runs_dir(&self) -> Utf8PathBuf {
        self.project_root.join("runs")
    }

    pub fn run_dir(&self, run: RunId) -> Utf8PathBuf {
        self.runs_dir().join(run.to_string())
    }

    pub fn extra_dir(&self, run: RunId) -> Utf8PathBuf {
        self.run_dir(run).join("extra")
    }

    pub fn manifest_path(&self, run: RunId) -> Utf8PathBuf {
        self.run_dir(run).join(MANIFEST_FILE)
    }

    pub fn ensure_project_root(&self) -> Result<(), TomoError> {
        fs::create_dir_all(self.project_root.as_std_path())
            .map_err(|err| TomoError::Filesystem(err.to_string()))
    }

    pub fn allocate_run(&self) -> Result<RunId, TomoError> {
        let runs = self.runs_dir();
        fs::create_dir_all(runs.as_std_path())
            .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        let mut candidate = self
            .run_ids()?
            .into_iter()
            .max()
            .map(RunId::next)
            .unwrap_or(RunId::new(1));
        loop {
            match fs::create_dir(self.run_dir(candidate).as_std_path()) {
                Ok(()) => break,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = candidate.next();
                }
                Err(err) => return Err(TomoError::Filesystem(err.to_string())),
            }
        }
        fs::create_dir_all(self.extra_dir(candidate).as_std_path())
            .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        Ok(candidate)
    }

    pub fn run_ids(&self) -> Result<Vec<RunId>, TomoError> {
        let runs = self.runs_dir();
        if !runs.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(runs.as_std_path()).map_err(|err| TomoError::Filesystem(err.to_string()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| TomoError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<RunId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn clear_project(&self) -> Result<(), TomoError> {
        if self.project_root.as_std_path().exists() {
            fs::remove_dir_all(self.project_root.as_std_path())
                .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<(), TomoError> {
        let path = self.manifest_path(manifest.run_id);
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&path, &content)
    }

    pub fn read_manifest(&self, run: RunId) -> Result<RunManifest, TomoError> {
        let path = self.manifest_path(run);
        if !path.as_std_path().exists() {
            return Err(TomoError::RunNotFound(run.to_string()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|err| TomoError::Filesystem(format!("{path}: {err}")))
    }

    pub fn list_manifests(&self) -> Result<Vec<RunManifest>, TomoError> {
        let mut manifests = Vec::new();
        for run in self.run_ids()? {
            if self.manifest_path(run).as_std_path().exists() {
                manifests.push(self.read_manifest(run)?);
            }
        }
        Ok(manifests)
    }

    pub fn imported_sources(&self) -> Result<HashSet<Utf8PathBuf>, TomoError> {
        let mut seen = HashSet::new();
        for manifest in self.list_manifests()? {
            if let Some(output) = &manifest.output {
                seen.extend(output.sources().into_iter().map(canonical_or_self));
            }
        }
        Ok(seen)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), TomoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| TomoError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), TomoError> {
        let write_err = |message: String| TomoError::FilesystemWrite {
            path: dest.to_owned(),
            message,
        };
        let parent = dest
            .parent()
            .ok_or_else(|| write_err("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path()).map_err(|err| write_err(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("tomo-import-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path()).map_err(|err| write_err(err.to_string()))?;
        temp.persist_noclobber(dest.as_std_path())
            .map_err(|err| write_err(err.error.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub protocol: String,
    pub kind: ItemKind,
    pub pattern: String,
    pub sampling_rate: f64,
    pub transfer: TransferMode,
    pub created_at: String,
    pub tool: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub output: Option<ImportOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
        (temp, Store::new_with_root(root))
    }

    #[test]
    fn layout_paths() {
        let (_temp, store) = temp_store();
        let run = RunId::new(3);
        assert!(store.extra_dir(run).ends_with("runs/run-0003/extra"));
        assert!(store.manifest_path(run).ends_with("runs/run-0003/run.json"));
    }

    #[test]
    fn allocate_run_is_monotonic() {
        let (_temp, store) = temp_store();
        let first = store.allocate_run().unwrap();
        let second = store.allocate_run().unwrap();
        assert_eq!(first, RunId::new(1));
        assert_eq!(second, RunId::new(2));
        assert!(store.extra_dir(second).as_std_path().is_dir());
    }

    #[test]
    fn copy_refuses_existing_destination() {
        let (temp, store) = temp_store();
        store.ensure_project_root().unwrap();
        let src = Utf8PathBuf::from_path_buf(temp.path().join("src.mrc")).unwrap();
        fs::write(src.as_std_path(), b"data").unwrap();
        let dest = store.project_root().join("dest.mrc");
        Store::copy_file_atomic(&src, &dest).unwrap();
        assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"data");
        assert!(Store::copy_file_atomic(&src, &dest).is_err());
    }
}
