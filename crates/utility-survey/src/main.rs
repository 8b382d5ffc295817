mod error;
mod report;
mod run;
mod settings;

use clap::Parser;
use settings::Settings;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    run::setup_logging();
    let settings = Settings::parse();

    let result = match run::run(&settings).await {
        Ok(report) => run::write_report(&report, &settings),
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
