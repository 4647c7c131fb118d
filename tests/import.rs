use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use tomo_import::app::{App, ImportRequest};
use tomo_import::coordinates::{CoordinateSource, TomogramRef};
use tomo_import::dataset::ImportOutput;
use tomo_import::domain::{ItemKind, RunId, TransferMode};
use tomo_import::error::TomoError;
use tomo_import::formats::{ContainerReader, Dimensions, MrcHeader};
use tomo_import::output::JsonOutput;
use tomo_import::store::Store;

struct Workspace {
    _temp: tempfile::TempDir,
    data: Utf8PathBuf,
    app: App<ContainerReader>,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let data = root.join("data");
        fs::create_dir_all(&data).unwrap();
        let store = Store::new_with_root(root.join("project"));
        Self {
            _temp: temp,
            data,
            app: App::new(store, ContainerReader),
        }
    }

    fn write_mrc(&self, name: &str, header: MrcHeader) -> Utf8PathBuf {
        let path = self.data.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, header.to_bytes()).unwrap();
        path
    }

    fn request(&self, pattern: &str, kind: ItemKind) -> ImportRequest {
        ImportRequest::from_pattern(kind, Some(self.data.as_str()), pattern, 1.5).unwrap()
    }

    fn store(&self) -> &Store {
        self.app.store()
    }
}

#[test]
fn zero_matches_registers_no_output() {
    let ws = Workspace::new();
    let result = ws
        .app
        .import(&ws.request("*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    assert!(result.output().is_none());
    assert_eq!(result.size(), 0);
    assert!(result.summary.is_empty());
    assert_eq!(result.manifest.warnings.len(), 1);
    assert!(result.manifest.warnings[0].contains("no files matching the pattern"));
}

#[test]
fn single_volume_becomes_scalar_output() {
    let ws = Workspace::new();
    ws.write_mrc("tomo_a.mrc", MrcHeader::volume(100, 80, 40));

    let result = ws
        .app
        .import(&ws.request("tomo_*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_matches!(output, ImportOutput::Single { .. });
    assert_eq!(output.name(), "outputTomogram");
    let item = &output.items()[0];
    assert_eq!(item.dimensions, Dimensions::new(100, 80, 40, 1));
    assert_eq!(item.origin.shifts(), (-75.0, -60.0, -30.0));
    assert_eq!(item.location.index, None);

    let linked = ws.store().extra_dir(result.run_id()).join("import_tomo_a.mrc");
    assert_eq!(item.location.path, linked);
    assert!(linked.as_std_path().is_file());
    assert!(ws.store().manifest_path(result.run_id()).as_std_path().is_file());
}

#[test]
fn several_volumes_become_collection_with_distinct_ids() {
    let ws = Workspace::new();
    ws.write_mrc("tomo_a.mrc", MrcHeader::volume(16, 16, 8));
    ws.write_mrc("tomo_b.mrc", MrcHeader::volume(16, 16, 8));

    let result = ws
        .app
        .import(&ws.request("tomo_*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_eq!(output.name(), "outputTomograms");
    assert_eq!(output.size(), 2);
    let ids: Vec<u64> = output.items().iter().map(|item| item.id.get()).collect();
    assert_eq!(ids, vec![1, 2]);
    let sources: Vec<u64> = output.items().iter().map(|item| item.source_id).collect();
    assert_eq!(sources, vec![1, 2]);
}

#[test]
fn mrc_image_stack_is_read_as_one_volume() {
    let ws = Workspace::new();
    ws.write_mrc("stacked.mrc", MrcHeader::image_stack(32, 32, 5));

    let result = ws
        .app
        .import(&ws.request("*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_eq!(output.size(), 1);
    assert_eq!(output.items()[0].dimensions, Dimensions::new(32, 32, 5, 1));
}

#[test]
fn mrcs_stack_expands_to_indexed_items() {
    let ws = Workspace::new();
    ws.write_mrc("particles.mrcs", MrcHeader::image_stack(24, 24, 3));

    let result = ws
        .app
        .import(&ws.request("*.mrcs", ItemKind::SubTomogram), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_eq!(output.name(), "outputSubTomograms");
    let labels: Vec<String> = output
        .items()
        .iter()
        .map(|item| item.location.to_string())
        .collect();
    assert_eq!(labels.len(), 3);
    assert!(labels[0].starts_with("1@"));
    assert!(labels[2].starts_with("3@"));
    assert!(labels.iter().all(|label| label.ends_with("import_particles.mrcs")));
}

#[test]
fn hash_marker_sets_source_ids() {
    let ws = Workspace::new();
    ws.write_mrc("ts_07.mrc", MrcHeader::volume(8, 8, 8));
    ws.write_mrc("ts_12.mrc", MrcHeader::volume(8, 8, 8));
    ws.write_mrc("ts_x.mrc", MrcHeader::volume(8, 8, 8));

    let result = ws
        .app
        .import(&ws.request("ts_##.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let sources: Vec<u64> = result
        .output()
        .unwrap()
        .items()
        .iter()
        .map(|item| item.source_id)
        .collect();
    assert_eq!(sources, vec![7, 12]);
}

#[test]
fn rerun_allocates_a_new_run() {
    let ws = Workspace::new();
    ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    let request = ws.request("*.mrc", ItemKind::Tomogram);

    let first = ws.app.import(&request, &JsonOutput).unwrap();
    let second = ws.app.import(&request, &JsonOutput).unwrap();

    assert_eq!(first.run_id(), RunId::new(1));
    assert_eq!(second.run_id(), RunId::new(2));
    assert_eq!(second.size(), 1);
    assert_eq!(ws.app.list(&JsonOutput).unwrap().runs.len(), 2);
}

#[test]
fn skip_imported_leaves_nothing_new() {
    let ws = Workspace::new();
    ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    let mut request = ws.request("*.mrc", ItemKind::Tomogram);
    ws.app.import(&request, &JsonOutput).unwrap();

    request.skip_imported = true;
    let again = ws.app.import(&request, &JsonOutput).unwrap();
    assert!(again.output().is_none());

    ws.write_mrc("tomo_new.mrc", MrcHeader::volume(8, 8, 8));
    let third = ws.app.import(&request, &JsonOutput).unwrap();
    let output = third.output().unwrap();
    assert_eq!(output.size(), 1);
    assert!(output.items()[0].source.ends_with("tomo_new.mrc"));
}

#[test]
fn basename_collision_aborts_run() {
    let ws = Workspace::new();
    ws.write_mrc("day1/tomo.mrc", MrcHeader::volume(8, 8, 8));
    ws.write_mrc("day2/tomo.mrc", MrcHeader::volume(8, 8, 8));

    let err = ws
        .app
        .import(&ws.request("day*/tomo.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap_err();

    assert_matches!(err, TomoError::DestinationExists(_));
    assert!(ws.app.list(&JsonOutput).unwrap().runs.is_empty());
    let extra = ws.store().extra_dir(RunId::new(1));
    assert!(extra.join("import_tomo.mrc").as_std_path().is_file());
}

#[test]
fn corrupt_header_aborts_run() {
    let ws = Workspace::new();
    ws.write_mrc("a_good.mrc", MrcHeader::volume(8, 8, 8));
    fs::write(ws.data.join("b_bad.mrc"), b"not an mrc header").unwrap();

    let err = ws
        .app
        .import(&ws.request("*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap_err();

    assert_matches!(err, TomoError::MetadataRead { .. });
}

#[test]
fn copy_mode_leaves_independent_file() {
    let ws = Workspace::new();
    let source = ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    let mut request = ws.request("*.mrc", ItemKind::Tomogram);
    request.transfer = TransferMode::Copy;

    let result = ws.app.import(&request, &JsonOutput).unwrap();
    let dest = result.output().unwrap().items()[0].location.path.clone();
    assert_eq!(fs::read(&dest).unwrap(), fs::read(&source).unwrap());

    fs::remove_file(&source).unwrap();
    assert!(dest.as_std_path().is_file());
}

#[test]
fn sidecar_acquisition_is_kept_verbatim() {
    let ws = Workspace::new();
    ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    fs::write(
        ws.data.join("tomo.acquisition.json"),
        r#"{"voltage": 200, "dose": 2.5}"#,
    )
    .unwrap();

    let result = ws
        .app
        .import(&ws.request("*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let acquisition = &result.output().unwrap().items()[0].acquisition;
    assert_eq!(acquisition.voltage, Some(200.0));
    assert_eq!(acquisition.spherical_aberration, Some(2.7));
    assert_eq!(acquisition.extra["dose"], serde_json::json!(2.5));
}

#[test]
fn subtomograms_fail_when_coordinates_run_out() {
    let ws = Workspace::new();
    ws.write_mrc("sub_1.mrc", MrcHeader::volume(8, 8, 8));
    ws.write_mrc("sub_2.mrc", MrcHeader::volume(8, 8, 8));
    let coords = ws.data.join("coords.txt");
    fs::write(&coords, "# x y z\n10 20 30\n").unwrap();

    let mut request = ws.request("sub_*.mrc", ItemKind::SubTomogram);
    request.coordinates = Some(CoordinateSource::File(coords));
    let err = ws.app.import(&request, &JsonOutput).unwrap_err();

    assert_matches!(err, TomoError::CoordinateMismatch(1));
}

#[test]
fn summary_and_methods_follow_the_output() {
    let ws = Workspace::new();
    ws.write_mrc("tomo_a.mrc", MrcHeader::volume(8, 8, 8));
    ws.write_mrc("tomo_b.mrc", MrcHeader::volume(8, 8, 8));
    let request = ws.request("tomo_*.mrc", ItemKind::Tomogram);

    let result = ws.app.import(&request, &JsonOutput).unwrap();
    let expected = format!(
        "Tomograms run-0001/outputTomograms imported from:\n{}",
        request.pattern.as_str()
    );
    assert_eq!(result.summary[0], expected);
    assert_eq!(result.summary[1], "Sampling rate: 1.50 (Å/px)");
    assert_eq!(
        result.methods,
        vec![" Tomograms run-0001/outputTomograms imported with a sampling rate 1.50"]
    );
}

#[test]
fn manifest_round_trips_through_store() {
    let ws = Workspace::new();
    ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    let result = ws
        .app
        .import(&ws.request("*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let stored = ws.store().read_manifest(result.run_id()).unwrap();
    assert_eq!(stored, result.manifest);
    assert_eq!(stored.protocol, "import tomograms");
    assert!(stored.tool.starts_with("tomo-import/"));
}

#[test]
fn clear_removes_every_run() {
    let ws = Workspace::new();
    ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    ws.app
        .import(&ws.request("*.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    assert!(ws.app.clear(&JsonOutput).unwrap().cleared);
    assert!(ws.app.list(&JsonOutput).unwrap().runs.is_empty());
    assert!(!ws.store().project_root().as_std_path().exists());
}

#[test]
fn lone_subtomogram_is_still_a_set() {
    let ws = Workspace::new();
    ws.write_mrc("sub_1.mrc", MrcHeader::volume(8, 8, 8));

    let result = ws
        .app
        .import(&ws.request("sub_*.mrc", ItemKind::SubTomogram), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_matches!(output, ImportOutput::Collection { .. });
    assert_eq!(output.name(), "outputSubTomograms");
    assert_eq!(output.size(), 1);
    assert!(result.summary[0].starts_with("SubTomograms run-0001/outputSubTomograms"));
}

#[test]
fn acquisition_sidecar_next_to_data_is_not_imported() {
    let ws = Workspace::new();
    ws.write_mrc("tomo_01.mrc", MrcHeader::volume(8, 8, 8));
    fs::write(ws.data.join("tomo_01.acquisition.json"), r#"{"voltage": 120}"#).unwrap();

    let result = ws
        .app
        .import(&ws.request("tomo_*", ItemKind::Tomogram), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_eq!(output.size(), 1);
    assert!(output.items()[0].source.ends_with("tomo_01.mrc"));
    assert_eq!(output.items()[0].acquisition.voltage, Some(120.0));
}

#[test]
fn symlink_mode_points_into_source_tree() {
    let ws = Workspace::new();
    let source = ws.write_mrc("tomo.mrc", MrcHeader::volume(8, 8, 8));
    let mut request = ws.request("*.mrc", ItemKind::Tomogram);
    request.transfer = TransferMode::Symlink;

    let result = ws.app.import(&request, &JsonOutput).unwrap();
    let dest = result.output().unwrap().items()[0].location.path.clone();
    let meta = fs::symlink_metadata(&dest).unwrap();
    assert!(meta.file_type().is_symlink());
    assert_eq!(
        fs::canonicalize(&dest).unwrap(),
        fs::canonicalize(&source).unwrap()
    );
}

#[test]
fn tilt_images_group_by_series_and_sort_by_order() {
    let ws = Workspace::new();
    for name in [
        "alpha_2_3.0.mrc",
        "alpha_1_0.0.mrc",
        "alpha_3_-3.0.mrc",
        "beta_1_0.0.mrc",
    ] {
        ws.write_mrc(name, MrcHeader::volume(16, 16, 1));
    }

    let result = ws
        .app
        .import(&ws.request("{TS}_{TO}_{TA}.mrc", ItemKind::TiltSeries), &JsonOutput)
        .unwrap();

    let output = result.output().unwrap();
    assert_eq!(output.name(), "outputTiltSeries");
    let ImportOutput::TiltSeries { set, .. } = output else {
        panic!("expected a tilt series output, got {output:?}");
    };
    assert_eq!(set.size(), 2);
    assert_eq!(set.image_total(), 4);

    let alpha = &set.series()[0];
    assert_eq!(alpha.ts_id, "alpha");
    assert_eq!(alpha.id.get(), 1);
    let angles: Vec<f64> = alpha.images.iter().map(|image| image.tilt_angle).collect();
    assert_eq!(angles, vec![0.0, 3.0, -3.0]);
    assert_eq!(alpha.angle_range(), Some((-3.0, 3.0)));
    assert_eq!(set.series()[1].ts_id, "beta");
    assert_eq!(set.series()[1].id.get(), 2);
    assert_eq!(result.summary[2], "Tilt series: 2 (4 images)");
}

#[test]
fn tilt_stack_takes_angles_from_tlt_file() {
    let ws = Workspace::new();
    ws.write_mrc("ts_a.mrcs", MrcHeader::image_stack(16, 16, 3));
    fs::write(ws.data.join("ts_a.tlt"), "-3.0\n0.0\n3.0\n").unwrap();

    let result = ws
        .app
        .import(&ws.request("{TS}.mrcs", ItemKind::TiltSeries), &JsonOutput)
        .unwrap();

    let Some(ImportOutput::TiltSeries { set, .. }) = result.output() else {
        panic!("expected a tilt series output");
    };
    let series = &set.series()[0];
    assert_eq!(series.ts_id, "ts_a");
    let indices: Vec<Option<u32>> = series.images.iter().map(|image| image.location.index).collect();
    assert_eq!(indices, vec![Some(1), Some(2), Some(3)]);
    let angles: Vec<f64> = series.images.iter().map(|image| image.tilt_angle).collect();
    assert_eq!(angles, vec![-3.0, 0.0, 3.0]);
}

#[test]
fn tilt_stack_with_short_angle_file_fails() {
    let ws = Workspace::new();
    ws.write_mrc("ts_a.mrcs", MrcHeader::image_stack(16, 16, 3));
    fs::write(ws.data.join("ts_a.tlt"), "-3.0\n3.0\n").unwrap();

    let err = ws
        .app
        .import(&ws.request("{TS}.mrcs", ItemKind::TiltSeries), &JsonOutput)
        .unwrap_err();

    assert_matches!(err, TomoError::TiltAngles { .. });
}

#[test]
fn movies_need_order_and_angle_tags() {
    let ws = Workspace::new();
    ws.write_mrc("ts_a.mrcs", MrcHeader::image_stack(16, 16, 3));

    let err = ws
        .app
        .import(&ws.request("{TS}.mrcs", ItemKind::TiltSeriesMovies), &JsonOutput)
        .unwrap_err();

    assert_matches!(err, TomoError::InvalidPattern(_));
    assert!(ws.app.list(&JsonOutput).unwrap().runs.is_empty());
}

fn import_tomogram_and_coordinates(ws: &Workspace) -> (RunId, RunId) {
    ws.write_mrc("tomo.mrc", MrcHeader::volume(64, 64, 32));
    let tomogram = ws
        .app
        .import(&ws.request("tomo.mrc", ItemKind::Tomogram), &JsonOutput)
        .unwrap()
        .run_id();

    fs::write(ws.data.join("picks_1.txt"), "# x y z\n10 10 10\n70 5 5\n").unwrap();
    let mut request = ws.request("picks_*.txt", ItemKind::Coordinates);
    request.box_size = Some(32);
    request.tomogram = Some(TomogramRef {
        run: tomogram,
        item: None,
    });
    let result = ws.app.import(&request, &JsonOutput).unwrap();

    let output = result.output().unwrap();
    assert_eq!(output.name(), "outputCoordinates");
    assert_eq!(output.size(), 2);
    assert_eq!(
        result.manifest.warnings,
        vec![format!("1 coordinates fall outside tomogram {tomogram}")]
    );
    assert!(result.summary.contains(&"Box size: 32".to_string()));
    (tomogram, result.run_id())
}

#[test]
fn coordinates_bind_to_an_imported_tomogram() {
    let ws = Workspace::new();
    let (tomogram, coordinates) = import_tomogram_and_coordinates(&ws);
    assert_eq!(tomogram, RunId::new(1));
    assert_eq!(coordinates, RunId::new(2));

    let info = ws.app.info(coordinates, &JsonOutput).unwrap();
    assert_eq!(info.items.len(), 2);
    assert!(info.items[0].starts_with("#1 (10.00, 10.00, 10.00)"));
}

#[test]
fn coordinates_need_box_size_and_tomogram_output() {
    let ws = Workspace::new();
    ws.write_mrc("sub_1.mrc", MrcHeader::volume(8, 8, 8));
    let subs = ws
        .app
        .import(&ws.request("sub_*.mrc", ItemKind::SubTomogram), &JsonOutput)
        .unwrap()
        .run_id();
    fs::write(ws.data.join("picks_1.txt"), "1 2 3\n").unwrap();

    let mut request = ws.request("picks_*.txt", ItemKind::Coordinates);
    request.tomogram = Some(TomogramRef {
        run: subs,
        item: None,
    });
    let err = ws.app.import(&request, &JsonOutput).unwrap_err();
    assert_matches!(err, TomoError::MissingParameter { .. });

    request.box_size = Some(16);
    let err = ws.app.import(&request, &JsonOutput).unwrap_err();
    assert_matches!(err, TomoError::MissingOutput { .. });
    assert_eq!(ws.app.list(&JsonOutput).unwrap().runs.len(), 1);
}

#[test]
fn subtomograms_pair_with_a_coordinates_run() {
    let ws = Workspace::new();
    let (_, coordinates) = import_tomogram_and_coordinates(&ws);
    ws.write_mrc("sub_1.mrc", MrcHeader::volume(8, 8, 8));
    ws.write_mrc("sub_2.mrc", MrcHeader::volume(8, 8, 8));

    let mut request = ws.request("sub_*.mrc", ItemKind::SubTomogram);
    request.coordinates = Some(CoordinateSource::Run(coordinates));
    let result = ws.app.import(&request, &JsonOutput).unwrap();

    let xs: Vec<f64> = result
        .output()
        .unwrap()
        .items()
        .iter()
        .filter_map(|item| item.coordinate.map(|coord| coord.x))
        .collect();
    assert_eq!(xs, vec![10.0, 70.0]);
    assert!(result.summary.contains(&"Coordinates 3D: 2".to_string()));
}
