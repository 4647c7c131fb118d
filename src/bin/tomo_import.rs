use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tomo_import::acquisition::Acquisition;
use tomo_import::app::{App, ImportRequest, ProgressSinkKind};
use tomo_import::config::ConfigLoader;
use tomo_import::coordinates::{CoordinateSource, TomogramRef};
use tomo_import::domain::{ItemKind, RunId, TransferMode};
use tomo_import::error::TomoError;
use tomo_import::formats::ContainerReader;
use tomo_import::output::{JsonOutput, OutputMode};
use tomo_import::store::Store;
use tomo_import::tui::Tui;

#[derive(Parser)]
#[command(name = "tomo-import")]
#[command(about = "Import tomograms, sub-tomograms, tilt series and 3D coordinates into a project-local store")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Import data (runs tomo-import.json without a subcommand)")]
    Import(ImportArgs),
    #[command(about = "List import runs")]
    List,
    #[command(about = "Show one import run")]
    Info(InfoArgs),
    #[command(about = "Remove the project-local store")]
    Clear,
}

#[derive(Args)]
struct ImportArgs {
    #[command(subcommand)]
    command: Option<ImportCommand>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum ImportCommand {
    #[command(about = "Import full tomograms")]
    Tomograms(VolumeArgs),
    #[command(about = "Import sub-tomograms, optionally paired with 3D coordinates")]
    Subtomograms(SubtomogramArgs),
    #[command(about = "Import tilt series grouped by {TS}, with {TO}/{TA} or .tlt angle files")]
    TiltSeries(TiltSeriesArgs),
    #[command(about = "Import 3D coordinates bound to an imported tomogram")]
    Coordinates(CoordinatesArgs),
}

#[derive(Args, Clone)]
struct VolumeArgs {
    #[arg(help = "Glob pattern; `#` runs mark digit ids (e.g. ts_##.mrc)")]
    pattern: String,

    #[arg(long)]
    sampling_rate: f64,

    #[arg(long)]
    files_path: Option<String>,

    #[arg(long)]
    copy: bool,

    #[arg(long, conflicts_with = "copy")]
    symlink: bool,

    #[arg(long)]
    skip_imported: bool,

    #[arg(long)]
    voltage: Option<f64>,

    #[arg(long)]
    spherical_aberration: Option<f64>,

    #[arg(long)]
    amplitude_contrast: Option<f64>,

    #[arg(long)]
    magnification: Option<f64>,

    #[arg(long)]
    phase_flipped: bool,
}

#[derive(Args, Clone)]
struct SubtomogramArgs {
    #[command(flatten)]
    volume: VolumeArgs,

    #[arg(long)]
    coordinates: Option<Utf8PathBuf>,

    #[arg(long, conflicts_with = "coordinates")]
    coordinates_run: Option<RunId>,
}

#[derive(Args, Clone)]
struct TiltSeriesArgs {
    #[command(flatten)]
    volume: VolumeArgs,

    #[arg(long)]
    movies: bool,

    #[arg(long)]
    dose_initial: Option<f64>,

    #[arg(long)]
    dose_per_frame: Option<f64>,
}

#[derive(Args, Clone)]
struct CoordinatesArgs {
    #[arg(help = "Glob pattern of coordinate text files")]
    pattern: String,

    #[arg(long)]
    sampling_rate: f64,

    #[arg(long)]
    files_path: Option<String>,

    #[arg(long)]
    box_size: u32,

    #[arg(long, help = "Tomogram run, optionally with an item id (run-0002:3)")]
    tomogram: TomogramRef,

    #[arg(long)]
    skip_imported: bool,
}

#[derive(Args)]
struct InfoArgs {
    run: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<TomoError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TomoError) -> u8 {
    match error {
        TomoError::RunNotFound(_) | TomoError::MissingConfig | TomoError::MissingOutput { .. } => 2,
        TomoError::MetadataRead { .. } | TomoError::UnsupportedFormat(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = Store::new()?;
    let app = App::new(store, ContainerReader);

    match cli.command {
        Some(Commands::Import(args)) => run_import(args, app, output_mode),
        Some(Commands::List) => run_list(app, output_mode),
        Some(Commands::Info(args)) => run_info(args, app, output_mode),
        Some(Commands::Clear) => run_clear(app, output_mode),
        None => Err(miette::Report::msg(
            "command required (try `tomo-import --help`)",
        )),
    }
}

fn build_request(kind: ItemKind, args: VolumeArgs) -> Result<ImportRequest, TomoError> {
    let mut request = ImportRequest::from_pattern(
        kind,
        args.files_path.as_deref(),
        &args.pattern,
        args.sampling_rate,
    )?;
    if args.copy {
        request.transfer = TransferMode::Copy;
    } else if args.symlink {
        request.transfer = TransferMode::Symlink;
    }
    request.skip_imported = args.skip_imported;
    let overrides = Acquisition {
        voltage: args.voltage,
        spherical_aberration: args.spherical_aberration,
        amplitude_contrast: args.amplitude_contrast,
        magnification: args.magnification,
        phase_flipped: args.phase_flipped.then_some(true),
        ..Acquisition::default()
    };
    request.acquisition = request.acquisition.overlay(&overrides);
    Ok(request)
}

fn run_import(
    args: ImportArgs,
    app: App<ContainerReader>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let requests = match args.command {
        Some(ImportCommand::Tomograms(volume)) => {
            vec![build_request(ItemKind::Tomogram, volume)?]
        }
        Some(ImportCommand::Subtomograms(sub)) => {
            let mut request = build_request(ItemKind::SubTomogram, sub.volume)?;
            request.coordinates = sub
                .coordinates
                .map(CoordinateSource::File)
                .or(sub.coordinates_run.map(CoordinateSource::Run));
            vec![request]
        }
        Some(ImportCommand::TiltSeries(ts)) => {
            let kind = if ts.movies {
                ItemKind::TiltSeriesMovies
            } else {
                ItemKind::TiltSeries
            };
            let mut request = build_request(kind, ts.volume)?;
            let doses = Acquisition {
                dose_initial: ts.dose_initial,
                dose_per_frame: ts.dose_per_frame,
                ..Acquisition::default()
            };
            request.acquisition = request.acquisition.overlay(&doses);
            vec![request]
        }
        Some(ImportCommand::Coordinates(coords)) => {
            let mut request = ImportRequest::from_pattern(
                ItemKind::Coordinates,
                coords.files_path.as_deref(),
                &coords.pattern,
                coords.sampling_rate,
            )?;
            request.box_size = Some(coords.box_size);
            request.tomogram = Some(coords.tomogram);
            request.skip_imported = coords.skip_imported;
            vec![request]
        }
        None => ConfigLoader::resolve(args.config.as_deref())?.imports,
    };

    if args.dry_run {
        return run_preview(requests, app, output_mode);
    }

    match output_mode {
        OutputMode::NonInteractive if requests.len() == 1 => {
            let result = app.import(&requests[0], &JsonOutput)?;
            JsonOutput::print_import(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::NonInteractive => {
            let result = app.import_all(&requests, &JsonOutput)?;
            JsonOutput::print_batch(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Import);
            let result = tui.run(move |sink| app.import_all(&requests, sink))?;
            tui.finish_batch(&result)?;
            Ok(())
        }
    }
}

fn run_preview(
    requests: Vec<ImportRequest>,
    app: App<ContainerReader>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            for request in &requests {
                let result = app.preview(request, &JsonOutput)?;
                JsonOutput::print_preview(&result).into_diagnostic()?;
            }
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Preview);
            let results = tui.run(move |sink| {
                requests
                    .iter()
                    .map(|request| app.preview(request, sink))
                    .collect::<Result<Vec<_>, TomoError>>()
            })?;
            for result in &results {
                tui.finish_preview(result)?;
            }
            Ok(())
        }
    }
}

fn run_list(app: App<ContainerReader>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.list(&JsonOutput)?;
            JsonOutput::print_list(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::List);
            let result = tui.run(move |sink| app.list(sink))?;
            tui.finish_list(&result)?;
            Ok(())
        }
    }
}

fn run_info(
    args: InfoArgs,
    app: App<ContainerReader>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let run = args.run.parse::<RunId>()?;

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.info(run, &JsonOutput)?;
            JsonOutput::print_info(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Info);
            let result = tui.run(move |sink| app.info(run, sink))?;
            tui.finish_info(&result)?;
            Ok(())
        }
    }
}

fn run_clear(app: App<ContainerReader>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.clear(&JsonOutput)?;
            JsonOutput::print_clear(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Clear);
            if !tui.confirm_clear()? {
                return Ok(());
            }
            let _result = tui.run(move |sink| app.clear(sink))?;
            tui.finish_clear()?;
            Ok(())
        }
    }
}
