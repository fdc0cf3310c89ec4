mod builder;
mod config;
mod constraints;
mod data;
mod error;
mod extract;
mod model;
mod objective;
mod optimizer;
mod server;
mod solver;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;
use log::{debug, error};

use crate::config::SolverParams;
use crate::data::TimetableResponse;
use crate::error::TimetableError;
use crate::optimizer::Failure;
use crate::solver::HighsBackend;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Weekly timetable generation with an LP/MIP solver",
    long_about = None
)]
struct Args {
    /// The department payload as a single JSON document.
    payload: Option<String>,

    /// Serve `POST /v1/timetable/solve` instead of solving one payload.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// The address to listen on in serve mode.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// The time budget for one solve, given in seconds.
    #[arg(short = 't', long = "time-limit", default_value_t = 60)]
    time_limit: u64,

    /// Number of solver threads.
    #[arg(long, default_value_t = 8)]
    workers: u32,

    #[arg(short = 'r', long = "seed", default_value_t = 42)]
    seed: u32,

    /// Lets the solver print its progress. Only honored in serve mode, stdout
    /// is reserved for the result document otherwise.
    #[arg(long = "solver-log", default_value_t = false)]
    solver_log: bool,

    /// Upper bound on solves running at the same time in serve mode.
    #[arg(long = "max-concurrent-solves", default_value_t = 2)]
    max_concurrent_solves: usize,

    /// Enables debug log messages.
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn solver_params(&self) -> SolverParams {
        SolverParams {
            time_limit: Duration::from_secs(self.time_limit),
            workers: self.workers,
            seed: self.seed,
            log_progress: self.serve && self.solver_log,
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .target(env_logger::Target::Stderr)
        .init();
}

fn emit(response: &TimetableResponse) {
    match serde_json::to_string(response) {
        Ok(document) => println!("{document}"),
        Err(e) => {
            error!("Failed to serialize the result: {}", e);
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                    "stats": { "error_type": "InternalError" },
                })
            );
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            init_logging(false);
            let failure = Failure::from_error(TimetableError::Argument(e.to_string()));
            emit(&failure.response);
            return ExitCode::SUCCESS;
        }
    };
    init_logging(args.verbose);
    debug!("{:?}", args);

    let params = args.solver_params();

    if args.serve {
        if let Err(e) = server::run_server(&args.bind, params, args.max_concurrent_solves).await {
            error!("Server stopped: {}", e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let Some(payload) = args.payload else {
        let failure = Failure::from_error(TimetableError::Argument(
            "expected a JSON payload argument or --serve".to_string(),
        ));
        emit(&failure.response);
        return ExitCode::SUCCESS;
    };

    let solved = tokio::task::spawn_blocking(move || {
        optimizer::solve_payload(&payload, &params, &HighsBackend)
    })
    .await;
    let response = match solved {
        Ok(Ok(response)) => response,
        Ok(Err(failure)) => failure.response,
        Err(e) => Failure::from_error(TimetableError::Internal(e.to_string())).response,
    };
    emit(&response);
    ExitCode::SUCCESS
}
