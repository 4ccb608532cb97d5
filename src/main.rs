use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use log::{LevelFilter, error, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use sagfit::fitting::driver::run_fit;

/// Fit a configured surface family to a measured profile.
///
/// Usage: `sagfit [data] [settings] [out_dir] [log_level]`. The defaults
/// match the exchange convention of the profile tooling: data from
/// `tempsurfacedata.txt`, configuration from `ConvertSettings.txt`, reports
/// into the working directory.
fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let level = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info);
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let data = PathBuf::from(args.get(1).map_or("tempsurfacedata.txt", String::as_str));
    let settings = PathBuf::from(args.get(2).map_or("ConvertSettings.txt", String::as_str));
    let out_dir = PathBuf::from(args.get(3).map_or(".", String::as_str));

    info!(
        "surface fit started {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    match run_fit(&data, &settings, &out_dir) {
        Ok(outcome) => {
            info!(
                "fitted {} surface, RMSE = {:.6e}",
                outcome.surface.family, outcome.statistics.rmse
            );
            println!("SUCCESS: Fitting completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            println!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}
