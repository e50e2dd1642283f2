use clap::{value_parser, Arg, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::mpsc::channel;

use libcharge_reduce::config::{Config, Pipeline};
use libcharge_reduce::pipeline::run;
use libcharge_reduce::reduce::ConfigTag;
use libcharge_reduce::worker_status::{Phase, WorkerStatus};

fn make_template_config(path: &Path) -> Result<(), std::io::Error> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())
}

/// The shared argument surface of the `events` and `fieldmaps` subcommands.
fn pipeline_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(
            Arg::new("input")
                .required(true)
                .help("Folder holding the per-iteration input files of one run"),
        )
        .arg(
            Arg::new("output")
                .required(true)
                .help("Path of the final HDF5 archive (forced to a .h5 extension)"),
        )
        .arg(
            Arg::new("tag")
                .required(true)
                .help("Run tag: photoemission, solarwind, or allparticles"),
        )
        .arg(
            Arg::new("max-iteration")
                .long("max-iteration")
                .value_parser(value_parser!(u32))
                .help("Process only iterations up to this number, inclusive"),
        )
        .arg(
            Arg::new("radius")
                .long("radius")
                .value_parser(value_parser!(f64))
                .help("Filter radius around the target point, micrometers"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_parser(value_parser!(usize))
                .help("Number of parallel worker threads"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .help("Target point in mm as x,y,z"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_parser(value_parser!(u64))
                .help("Abort the run after this many seconds"),
        )
}

fn parse_target(text: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("target must be x,y,z -- got {text}"));
    }
    let mut target = [0.0f32; 3];
    for (slot, part) in target.iter_mut().zip(parts.iter()) {
        *slot = part
            .trim()
            .parse::<f32>()
            .map_err(|e| format!("bad target component {part}: {e}"))?;
    }
    Ok(target)
}

/// Assemble a Config from the parsed subcommand arguments.
fn config_from_matches(pipeline: Pipeline, matches: &ArgMatches) -> Result<Config, String> {
    let tag_text = matches
        .get_one::<String>("tag")
        .expect("tag is a required argument");
    let tag = ConfigTag::from_str(tag_text).map_err(|e| e.to_string())?;

    let mut config = Config {
        pipeline,
        input_path: PathBuf::from(
            matches
                .get_one::<String>("input")
                .expect("input is a required argument"),
        ),
        output_path: PathBuf::from(
            matches
                .get_one::<String>("output")
                .expect("output is a required argument"),
        ),
        tag,
        ..Config::default()
    };

    config.max_iteration = matches.get_one::<u32>("max-iteration").copied();
    if let Some(radius) = matches.get_one::<f64>("radius") {
        config.radius_um = *radius;
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.n_workers = *workers;
    }
    if let Some(target) = matches.get_one::<String>("target") {
        config.target = parse_target(target)?;
    }
    config.timeout_s = matches.get_one::<u64>("timeout").copied();

    Ok(config)
}

/// Run the pipeline on a spawned thread, rendering one progress bar per
/// worker from the status stream.
fn execute(config: Config, pb_manager: &MultiProgress) -> ExitCode {
    log::info!("Input path: {}", config.input_path.to_string_lossy());
    log::info!("Output archive: {}", config.archive_path().to_string_lossy());
    log::info!("Run tag: {}", config.tag.as_str());
    log::info!(
        "Workers: {} Radius: {} um Target: {:?} mm",
        config.n_workers,
        config.radius_um,
        config.target
    );

    let style = match ProgressStyle::with_template(
        "{prefix} [{bar:40.cyan/blue}] {percent}% {msg}",
    ) {
        Ok(style) => style,
        Err(e) => {
            log::error!("Could not create progress style: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (tx, rx) = channel::<WorkerStatus>();
    let handle = std::thread::spawn(move || run(&config, tx));

    // The receive loop ends when the last worker's sender clone is dropped.
    let mut bars: HashMap<usize, ProgressBar> = HashMap::new();
    while let Ok(status) = rx.recv() {
        let bar = bars.entry(status.worker_id).or_insert_with(|| {
            let bar = pb_manager.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_prefix(format!("Worker {}", status.worker_id));
            bar
        });
        bar.set_position((status.progress * 100.0) as u64);
        bar.set_message(status.current_file.clone());
        if status.phase == Phase::Finished {
            bar.finish_with_message("Done");
        }
    }

    match handle.join() {
        Ok(Ok(summary)) => {
            log::info!(
                "Processed {} files ({} skipped) into {} in {:.1}s",
                summary.processed,
                summary.skipped,
                summary.archive_path.to_string_lossy(),
                summary.elapsed.as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            log::error!("Run failed with error: {e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            log::error!("Failed to join the pipeline task!");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let matches = Command::new("charge_reduce_cli")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand(pipeline_command(
            "events",
            "Reduce per-iteration hit-event files to particle-population positions",
        ))
        .subcommand(pipeline_command(
            "fieldmaps",
            "Filter per-iteration field-map files around the target point",
        ))
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(Arg::new("path").required(true).help("Path to the file")),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return ExitCode::FAILURE;
    }

    let (pipeline, sub_matches) = match matches.subcommand() {
        Some(("new", sub_matches)) => {
            let path = PathBuf::from(
                sub_matches
                    .get_one::<String>("path")
                    .expect("path is a required argument"),
            );
            log::info!("Making a template config at {}...", path.to_string_lossy());
            if let Err(e) = make_template_config(&path) {
                log::error!("Could not write template config: {e}");
                return ExitCode::FAILURE;
            }
            log::info!("Done.");
            return ExitCode::SUCCESS;
        }
        Some(("events", sub_matches)) => (Pipeline::Events, sub_matches),
        Some(("fieldmaps", sub_matches)) => (Pipeline::FieldMaps, sub_matches),
        _ => unreachable!("subcommand is required"),
    };

    let config = match config_from_matches(pipeline, sub_matches) {
        Ok(config) => config,
        Err(message) => {
            log::error!("{message}");
            return ExitCode::FAILURE;
        }
    };

    execute(config, &pb_manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("-0.1,0,0.122"), Ok([-0.1, 0.0, 0.122]));
        assert_eq!(parse_target(" 1.0, 2.0, 3.0 "), Ok([1.0, 2.0, 3.0]));
        assert!(parse_target("1,2").is_err());
        assert!(parse_target("1,2,three").is_err());
    }
}
