use crate::dataset::{ImportOutput, ImportedItem};
use crate::domain::ItemKind;
use crate::store::RunManifest;
use crate::tilt_series::TiltSeries;

fn output_message(manifest: &RunManifest, output: &ImportOutput) -> String {
    let label = if output.is_scalar() {
        manifest.kind.singular_label()
    } else {
        manifest.kind.plural_label()
    };
    format!("{label} {}/{}", manifest.run_id, output.name())
}

pub fn summary(manifest: &RunManifest) -> Vec<String> {
    let Some(output) = &manifest.output else {
        return Vec::new();
    };
    let mut lines = vec![format!(
        "{} imported from:\n{}",
        output_message(manifest, output),
        manifest.pattern
    )];
    if manifest.sampling_rate > 0.0 {
        lines.push(format!("Sampling rate: {:.2} (Å/px)", manifest.sampling_rate));
    }
    match output {
        ImportOutput::TiltSeries { set, .. } => {
            lines.push(format!(
                "Tilt series: {} ({} images)",
                set.size(),
                set.image_total()
            ));
            if !set.acquisition().is_empty() {
                lines.push(format!("Acquisition: {}", set.acquisition().describe()));
            }
        }
        ImportOutput::Coordinates { set, .. } => {
            lines.push(format!("Box size: {}", set.box_size()));
            lines.push(format!("Tomogram: {}", set.tomogram().reference));
        }
        ImportOutput::Single { .. } | ImportOutput::Collection { .. } => {
            if let Some(first) = output.items().first() {
                lines.push(format!("Acquisition: {}", first.acquisition.describe()));
            }
            if manifest.kind == ItemKind::SubTomogram {
                let paired = output
                    .items()
                    .iter()
                    .filter(|item| item.coordinate.is_some())
                    .count();
                if paired > 0 {
                    lines.push(format!("Coordinates 3D: {paired}"));
                }
            }
        }
    }
    lines
}

pub fn methods(manifest: &RunManifest) -> Vec<String> {
    let Some(output) = &manifest.output else {
        return Vec::new();
    };
    let mut line = format!(
        " {} imported with a sampling rate {:.2}",
        output_message(manifest, output),
        manifest.sampling_rate
    );
    if let ImportOutput::Coordinates { set, .. } = output {
        line.push_str(&format!(
            " and a box size {} on tomogram {}",
            set.box_size(),
            set.tomogram().reference
        ));
    }
    vec![line]
}

pub fn item_line(item: &ImportedItem) -> String {
    let (ox, oy, oz) = item.origin.shifts();
    format!(
        "#{} {} [{}] origin ({ox:.2}, {oy:.2}, {oz:.2})",
        item.id, item.location, item.dimensions
    )
}

fn series_line(series: &TiltSeries) -> String {
    let mut line = format!("#{} {}: {} images", series.id, series.ts_id, series.images.len());
    if let Some((low, high)) = series.angle_range() {
        line.push_str(&format!(", tilt {low:.1}..{high:.1}"));
    }
    line
}

pub fn item_lines(output: &ImportOutput) -> Vec<String> {
    match output {
        ImportOutput::Single { .. } | ImportOutput::Collection { .. } => {
            output.items().iter().map(item_line).collect()
        }
        ImportOutput::TiltSeries { set, .. } => set.series().iter().map(series_line).collect(),
        ImportOutput::Coordinates { set, .. } => set
            .coordinates()
            .iter()
            .map(|coord| {
                format!(
                    "#{} ({:.2}, {:.2}, {:.2}) from {}",
                    coord.id, coord.position.x, coord.position.y, coord.position.z, coord.source
                )
            })
            .collect(),
    }
}
