use std::collections::HashSet;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::acquisition::{self, Acquisition};
use crate::coordinates::{self, BoundTomogram, CoordinateQueue, CoordinateSet, CoordinateSource, TomogramRef};
use crate::dataset::{FileLocation, ImportOutput, ImportedCollection, ItemDraft, SourceFile};
use crate::domain::{ItemKind, RunId, TransferMode};
use crate::error::TomoError;
use crate::formats::{ContainerFormat, Dimensions, HeaderReader};
use crate::fs_util::{import_file_name, transfer};
use crate::geometry::{Origin, centered_origin};
use crate::pattern::{FilePattern, ResolvedFiles, canonical_or_self};
use crate::report;
use crate::store::{RunManifest, Store};
use crate::tilt_series::{self, SeriesFiles, TiltImage, TiltSeriesPattern, TiltSeriesSet};

#[derive(Debug, Clone)]
pub enum SourcePattern {
    Files(FilePattern),
    TiltSeries(TiltSeriesPattern),
}

impl SourcePattern {
    pub fn as_str(&self) -> &str {
        match self {
            SourcePattern::Files(pattern) => pattern.as_str(),
            SourcePattern::TiltSeries(pattern) => pattern.as_str(),
        }
    }
}

impl From<FilePattern> for SourcePattern {
    fn from(pattern: FilePattern) -> Self {
        SourcePattern::Files(pattern)
    }
}

impl From<TiltSeriesPattern> for SourcePattern {
    fn from(pattern: TiltSeriesPattern) -> Self {
        SourcePattern::TiltSeries(pattern)
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub kind: ItemKind,
    pub pattern: SourcePattern,
    pub sampling_rate: f64,
    pub transfer: TransferMode,
    pub acquisition: Acquisition,
    pub coordinates: Option<CoordinateSource>,
    pub box_size: Option<u32>,
    pub tomogram: Option<TomogramRef>,
    pub skip_imported: bool,
}

impl ImportRequest {
    pub fn new(
        kind: ItemKind,
        pattern: impl Into<SourcePattern>,
        sampling_rate: f64,
    ) -> Result<Self, TomoError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(TomoError::InvalidSamplingRate(sampling_rate));
        }
        let pattern = pattern.into();
        let fits = match &pattern {
            SourcePattern::Files(_) => !kind.is_tilt_series(),
            SourcePattern::TiltSeries(_) => kind.is_tilt_series(),
        };
        if !fits {
            return Err(TomoError::InvalidPattern(format!(
                "{} can not drive a {kind} import",
                pattern.as_str()
            )));
        }
        Ok(Self {
            kind,
            pattern,
            sampling_rate,
            transfer: TransferMode::default(),
            acquisition: Acquisition::with_defaults(),
            coordinates: None,
            box_size: None,
            tomogram: None,
            skip_imported: false,
        })
    }

    pub fn from_pattern(
        kind: ItemKind,
        files_path: Option<&str>,
        pattern: &str,
        sampling_rate: f64,
    ) -> Result<Self, TomoError> {
        let pattern = if kind.is_tilt_series() {
            SourcePattern::TiltSeries(TiltSeriesPattern::with_dir(files_path, pattern)?)
        } else {
            SourcePattern::Files(FilePattern::with_dir(files_path, pattern)?)
        };
        Self::new(kind, pattern, sampling_rate)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub manifest: RunManifest,
    pub summary: Vec<String>,
    pub methods: Vec<String>,
}

impl ImportResult {
    pub fn run_id(&self) -> RunId {
        self.manifest.run_id
    }

    pub fn output(&self) -> Option<&ImportOutput> {
        self.manifest.output.as_ref()
    }

    pub fn size(&self) -> usize {
        self.output().map(ImportOutput::size).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub runs: Vec<ImportResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub pattern: String,
    pub files: Vec<PreviewEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SeriesPreview>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewEntry {
    pub path: Utf8PathBuf,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ContainerFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPreview {
    pub ts_id: String,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub runs: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub run_id: RunId,
    pub kind: ItemKind,
    pub pattern: String,
    pub output: Option<String>,
    pub size: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub manifest: RunManifest,
    pub summary: Vec<String>,
    pub methods: Vec<String>,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Import,
    Preview,
    List,
    Info,
    Clear,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

fn warn(warnings: &mut Vec<String>, warning: String) {
    tracing::warn!("{warning}");
    warnings.push(warning);
}

struct OpenRun {
    id: RunId,
    extra_dir: Utf8PathBuf,
    started: Instant,
    warnings: Vec<String>,
}

#[derive(Clone)]
pub struct App<H: HeaderReader> {
    store: Store,
    reader: H,
}

impl<H: HeaderReader> App<H> {
    pub fn new(store: Store, reader: H) -> Self {
        Self { store, reader }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn import_all(
        &self,
        requests: &[ImportRequest],
        sink: &dyn ProgressSink,
    ) -> Result<BatchResult, TomoError> {
        let mut runs = Vec::with_capacity(requests.len());
        for request in requests {
            runs.push(self.import(request, sink)?);
        }
        Ok(BatchResult { runs })
    }

    pub fn import(
        &self,
        request: &ImportRequest,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, TomoError> {
        let started = Instant::now();
        tracing::info!("Using pattern: '{}'", request.pattern.as_str());
        emit(sink, format!("phase=Resolve; pattern {}", request.pattern.as_str()));

        match (&request.pattern, request.kind) {
            (SourcePattern::TiltSeries(pattern), _) => {
                self.import_tilt_series(request, pattern, started, sink)
            }
            (SourcePattern::Files(pattern), ItemKind::Coordinates) => {
                self.import_coordinates(request, pattern, started, sink)
            }
            (SourcePattern::Files(pattern), _) => {
                self.import_volumes(request, pattern, started, sink)
            }
        }
    }

    fn import_volumes(
        &self,
        request: &ImportRequest,
        pattern: &FilePattern,
        started: Instant,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, TomoError> {
        let files = self.resolve_files(request, pattern)?;
        let total = files.len();

        let mut warnings = Vec::new();
        if total == 0 {
            warn(&mut warnings, no_matches(request));
        }
        let mut queue = self.coordinate_queue(request, &mut warnings)?;
        let mut run = self.open_run(started, warnings)?;

        let mut collection = ImportedCollection::new(request.kind, request.sampling_rate);
        for (position, matched) in files.enumerate() {
            emit(
                sink,
                format!("phase=Read; file {}/{total} {}", position + 1, matched.path),
            );
            let (format, dimensions) = self.reader.dimensions(&matched.path)?;
            let source = SourceFile {
                path: matched.path,
                id: matched.id,
                format,
                dimensions,
            };
            let (x, y, z, n) = dimensions.as_tuple();
            tracing::info!("Dimensions: ({x}, {y}, {z}, {n})  [{format}] {}", source.path);
            let origin = centered_origin(&dimensions, request.sampling_rate);

            let dest = import_file_name(&run.extra_dir, &source.path)?;
            emit(sink, format!("phase=Transfer; {} -> {dest}", source.path));
            transfer(&source.path, &dest, request.transfer)?;
            tracing::debug!("{} {} -> {dest}", request.transfer, source.path);

            let acquisition = acquisition::extract_for(&source.path, &request.acquisition)?;

            emit(sink, format!("phase=Register; {}", source.path));
            let count = source.multiplicity();
            let locations: Vec<FileLocation> = if count == 1 {
                vec![FileLocation::file(dest.clone())]
            } else {
                (1..=count)
                    .map(|index| FileLocation::indexed(dest.clone(), index))
                    .collect()
            };
            for location in locations {
                let coordinate = match queue.as_mut() {
                    Some(queue) => Some(queue.take_next()?),
                    None => None,
                };
                collection.append(ItemDraft {
                    kind: request.kind,
                    sampling_rate: request.sampling_rate,
                    location,
                    source: source.path.clone(),
                    source_id: source.id,
                    dimensions,
                    acquisition: acquisition.clone(),
                    origin,
                    coordinate,
                })?;
            }
        }

        if let Some(queue) = &queue
            && queue.remaining() > 0
        {
            warn(
                &mut run.warnings,
                format!("{} coordinates were not paired", queue.remaining()),
            );
        }

        self.finish_run(request, run, collection.into_output(), sink)
    }

    fn import_tilt_series(
        &self,
        request: &ImportRequest,
        pattern: &TiltSeriesPattern,
        started: Instant,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, TomoError> {
        if request.kind == ItemKind::TiltSeriesMovies && !pattern.angles_in_pattern() {
            return Err(TomoError::InvalidPattern(
                "when importing movies, {TA} and {TO} should be in the files pattern".to_string(),
            ));
        }
        let groups = self.resolve_series(request, pattern)?;
        let total: usize = groups.iter().map(|group| group.files.len()).sum();

        let mut warnings = Vec::new();
        if total == 0 {
            warn(&mut warnings, no_matches(request));
        }
        if request.coordinates.is_some() {
            warn(
                &mut warnings,
                format!("coordinates ignored for {} imports", request.kind),
            );
        }
        let run = self.open_run(started, warnings)?;

        let mut set = TiltSeriesSet::new(request.kind, request.sampling_rate, request.acquisition.clone());
        let mut position = 0;
        for group in groups {
            let mut images = Vec::new();
            for file in group.files {
                position += 1;
                emit(
                    sink,
                    format!("phase=Read; file {position}/{total} {}", file.path),
                );
                let (format, dimensions) = self.reader.dimensions(&file.path)?;
                let (x, y, z, n) = dimensions.as_tuple();
                tracing::info!("Dimensions: ({x}, {y}, {z}, {n})  [{format}] {}", file.path);
                let angles = match file.tilt {
                    Some(_) => Vec::new(),
                    None => stack_angles(&file.path, &dimensions)?,
                };

                let dest = import_file_name(&run.extra_dir, &file.path)?;
                emit(sink, format!("phase=Transfer; {} -> {dest}", file.path));
                transfer(&file.path, &dest, request.transfer)?;

                emit(sink, format!("phase=Register; {}", file.path));
                match file.tilt {
                    Some(tilt) => images.push(TiltImage {
                        location: FileLocation::file(dest),
                        source: file.path,
                        acquisition_order: tilt.acquisition_order,
                        tilt_angle: tilt.tilt_angle,
                        dimensions,
                    }),
                    None => {
                        for (index, angle) in (1..).zip(angles) {
                            images.push(TiltImage {
                                location: FileLocation::indexed(dest.clone(), index),
                                source: file.path.clone(),
                                acquisition_order: index,
                                tilt_angle: angle,
                                dimensions,
                            });
                        }
                    }
                }
            }
            tracing::info!("tilt series {}: {} images", group.ts_id, images.len());
            set.append(group.ts_id, images)?;
        }

        self.finish_run(request, run, ImportOutput::tilt_series(set), sink)
    }

    fn import_coordinates(
        &self,
        request: &ImportRequest,
        pattern: &FilePattern,
        started: Instant,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, TomoError> {
        let box_size = request.box_size.ok_or_else(|| TomoError::MissingParameter {
            kind: request.kind.to_string(),
            parameter: "a box size",
        })?;
        let reference = request.tomogram.ok_or_else(|| TomoError::MissingParameter {
            kind: request.kind.to_string(),
            parameter: "a tomogram (run or run:item)",
        })?;
        let tomogram = self.bind_tomogram(reference)?;
        let mut set = CoordinateSet::new(box_size, request.sampling_rate, tomogram)?;

        let files = self.resolve_files(request, pattern)?;
        let total = files.len();
        let mut warnings = Vec::new();
        if total == 0 {
            warn(&mut warnings, no_matches(request));
        }
        let mut run = self.open_run(started, warnings)?;

        for (position, matched) in files.enumerate() {
            emit(
                sink,
                format!("phase=Read; file {}/{total} {}", position + 1, matched.path),
            );
            let positions = coordinates::load(&matched.path)?;
            tracing::info!("{} coordinates in {}", positions.len(), matched.path);

            emit(sink, format!("phase=Register; {}", matched.path));
            for coord in positions {
                set.append(coord, &matched.path, matched.id);
            }
        }

        let outside = set
            .coordinates()
            .iter()
            .filter(|coord| !set.tomogram().contains(&coord.position))
            .count();
        if outside > 0 {
            warn(
                &mut run.warnings,
                format!(
                    "{outside} coordinates fall outside tomogram {}",
                    set.tomogram().reference
                ),
            );
        }

        self.finish_run(request, run, ImportOutput::coordinates(set), sink)
    }

    fn resolve_files(
        &self,
        request: &ImportRequest,
        pattern: &FilePattern,
    ) -> Result<ResolvedFiles, TomoError> {
        let files = pattern.resolve()?;
        if !request.skip_imported {
            return Ok(files);
        }
        Ok(files.excluding(&self.store.imported_sources()?))
    }

    fn resolve_series(
        &self,
        request: &ImportRequest,
        pattern: &TiltSeriesPattern,
    ) -> Result<Vec<SeriesFiles>, TomoError> {
        let mut groups = pattern.resolve()?;
        if request.skip_imported {
            let seen: HashSet<Utf8PathBuf> = self.store.imported_sources()?;
            for group in &mut groups {
                group
                    .files
                    .retain(|file| !seen.contains(&canonical_or_self(&file.path)));
            }
            groups.retain(|group| !group.files.is_empty());
        }
        Ok(groups)
    }

    fn coordinate_queue(
        &self,
        request: &ImportRequest,
        warnings: &mut Vec<String>,
    ) -> Result<Option<CoordinateQueue>, TomoError> {
        let Some(source) = &request.coordinates else {
            return Ok(None);
        };
        if request.kind != ItemKind::SubTomogram {
            warn(
                warnings,
                format!("coordinates {source} ignored for {} imports", request.kind),
            );
            return Ok(None);
        }
        let coords = match source {
            CoordinateSource::File(path) => coordinates::load(path)?,
            CoordinateSource::Run(run) => self.coordinate_set(*run)?.positions(),
        };
        Ok(Some(CoordinateQueue::new(coords)))
    }

    fn coordinate_set(&self, run: RunId) -> Result<CoordinateSet, TomoError> {
        match self.store.read_manifest(run)?.output {
            Some(ImportOutput::Coordinates { set, .. }) => Ok(set),
            _ => Err(TomoError::MissingOutput {
                run: run.to_string(),
                expected: "coordinates".to_string(),
            }),
        }
    }

    fn bind_tomogram(&self, reference: TomogramRef) -> Result<BoundTomogram, TomoError> {
        let manifest = self.store.read_manifest(reference.run)?;
        let items = match &manifest.output {
            Some(output) if manifest.kind == ItemKind::Tomogram => output.items(),
            _ => &[],
        };
        let item = match reference.item {
            Some(id) => items.iter().find(|item| item.id.get() == id),
            None if items.len() == 1 => items.first(),
            None => None,
        };
        let Some(item) = item else {
            let expected = match reference.item {
                Some(id) => format!("tomogram #{id}"),
                None => "single tomogram".to_string(),
            };
            return Err(TomoError::MissingOutput {
                run: reference.run.to_string(),
                expected,
            });
        };
        Ok(BoundTomogram {
            reference,
            item: item.id,
            location: item.location.clone(),
            dimensions: item.dimensions,
        })
    }

    fn open_run(&self, started: Instant, warnings: Vec<String>) -> Result<OpenRun, TomoError> {
        self.store.ensure_project_root()?;
        let id = self.store.allocate_run()?;
        tracing::debug!("allocated {id} at {}", self.store.run_dir(id));
        Ok(OpenRun {
            id,
            extra_dir: self.store.extra_dir(id),
            started,
            warnings,
        })
    }

    fn finish_run(
        &self,
        request: &ImportRequest,
        run: OpenRun,
        output: Option<ImportOutput>,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, TomoError> {
        let run_id = run.id;
        match &output {
            Some(output) => tracing::info!(
                "registered {}/{} with {} {}",
                run_id,
                output.name(),
                output.size(),
                request.kind.plural_label().to_lowercase()
            ),
            None => tracing::info!("{run_id} registered no output"),
        }

        emit(sink, format!("phase=Store; writing {run_id} manifest"));
        let manifest = RunManifest {
            run_id,
            protocol: request.kind.protocol_label().to_string(),
            kind: request.kind,
            pattern: request.pattern.as_str().to_string(),
            sampling_rate: request.sampling_rate,
            transfer: request.transfer,
            created_at: iso_timestamp(),
            tool: format!("tomo-import/{}", env!("CARGO_PKG_VERSION")),
            warnings: run.warnings,
            output,
        };
        self.store.write_manifest(&manifest)?;

        sink.event(ProgressEvent {
            message: format!("phase=Store; {run_id} done"),
            elapsed: Some(run.started.elapsed()),
        });

        Ok(ImportResult {
            summary: report::summary(&manifest),
            methods: report::methods(&manifest),
            manifest,
        })
    }

    pub fn preview(
        &self,
        request: &ImportRequest,
        sink: &dyn ProgressSink,
    ) -> Result<PreviewResult, TomoError> {
        let pattern = request.pattern.as_str();
        emit(sink, format!("phase=Resolve; pattern {pattern}"));

        let mut entries = Vec::new();
        let mut series = Vec::new();
        match &request.pattern {
            SourcePattern::TiltSeries(ts_pattern) => {
                let groups = self.resolve_series(request, ts_pattern)?;
                let total: usize = groups.iter().map(|group| group.files.len()).sum();
                for group in &groups {
                    for path in group.paths() {
                        let id = entries.len() as u64 + 1;
                        emit(sink, format!("phase=Read; file {id}/{total} {path}"));
                        let (format, dimensions) = self.reader.dimensions(path)?;
                        entries.push(PreviewEntry {
                            path: path.to_owned(),
                            id,
                            format: Some(format),
                            dimensions: Some(dimensions),
                            origin: None,
                            coordinates: None,
                        });
                    }
                    series.push(SeriesPreview {
                        ts_id: group.ts_id.clone(),
                        files: group.files.len(),
                    });
                }
            }
            SourcePattern::Files(file_pattern) => {
                let files = self.resolve_files(request, file_pattern)?;
                let total = files.len();
                for (position, matched) in files.enumerate() {
                    emit(
                        sink,
                        format!("phase=Read; file {}/{total} {}", position + 1, matched.path),
                    );
                    let entry = if request.kind == ItemKind::Coordinates {
                        PreviewEntry {
                            coordinates: Some(coordinates::load(&matched.path)?.len()),
                            path: matched.path,
                            id: matched.id,
                            format: None,
                            dimensions: None,
                            origin: None,
                        }
                    } else {
                        let (format, dimensions) = self.reader.dimensions(&matched.path)?;
                        PreviewEntry {
                            origin: Some(centered_origin(&dimensions, request.sampling_rate)),
                            path: matched.path,
                            id: matched.id,
                            format: Some(format),
                            dimensions: Some(dimensions),
                            coordinates: None,
                        }
                    };
                    entries.push(entry);
                }
            }
        }

        let mut warnings = Vec::new();
        if entries.is_empty() {
            warnings.push(no_matches(request));
        }

        Ok(PreviewResult {
            pattern: pattern.to_string(),
            files: entries,
            series,
            warnings,
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, TomoError> {
        emit(sink, "phase=Resolve; scanning runs".to_string());
        let runs = self
            .store
            .list_manifests()?
            .into_iter()
            .map(|manifest| ListEntry {
                size: manifest.output.as_ref().map(ImportOutput::size).unwrap_or(0),
                output: manifest.output.as_ref().map(|out| out.name().to_string()),
                run_id: manifest.run_id,
                kind: manifest.kind,
                pattern: manifest.pattern,
                created_at: manifest.created_at,
            })
            .collect();
        Ok(ListResult { runs })
    }

    pub fn info(&self, run: RunId, sink: &dyn ProgressSink) -> Result<InfoResult, TomoError> {
        emit(sink, format!("phase=Resolve; looking up {run}"));
        let manifest = self.store.read_manifest(run)?;
        let items = manifest
            .output
            .as_ref()
            .map(report::item_lines)
            .unwrap_or_default();
        Ok(InfoResult {
            summary: report::summary(&manifest),
            methods: report::methods(&manifest),
            items,
            manifest,
        })
    }

    pub fn clear(&self, sink: &dyn ProgressSink) -> Result<ClearResult, TomoError> {
        emit(sink, "phase=Store; clearing project store".to_string());
        self.store.clear_project()?;
        Ok(ClearResult { cleared: true })
    }
}

fn no_matches(request: &ImportRequest) -> String {
    TomoError::PatternResolutionEmpty(request.pattern.as_str().to_string()).to_string()
}

fn stack_angles(stack: &Utf8Path, dimensions: &Dimensions) -> Result<Vec<f64>, TomoError> {
    let angles = tilt_series::load_angles(stack)?;
    let count = tilt_series::image_count(dimensions);
    if angles.len() != count as usize {
        return Err(TomoError::TiltAngles {
            path: tilt_series::angles_path(stack),
            message: format!("{} angles for {count} images", angles.len()),
        });
    }
    Ok(angles)
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
