//! Submit observations to a reputation aggregator.
//!
//! Observations come from the command line or, when none are given, from
//! stdin one per line. Everything is sent in one forced flush at exit, split
//! into several reports when it outgrows the carrier.

use std::io::{self, BufRead};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rps_client::observation::parse_line;
use rps_client::{ClientConfig, Flush, Observation};

#[derive(Parser, Debug)]
#[command(name = "rps-report")]
#[command(version, about = "Report IP address observations to an aggregator")]
struct Args {
    /// Aggregator address, host[:port] (overrides RPS_SERVER)
    #[arg(short, long)]
    server: Option<String>,

    /// udp or tcp (overrides RPS_TRANSPORT)
    #[arg(short, long)]
    transport: Option<String>,

    /// Account name (overrides RPS_USERNAME)
    #[arg(short, long)]
    username: Option<String>,

    /// Socket timeout in seconds (overrides RPS_TIMEOUT_SECS)
    #[arg(long)]
    timeout: Option<u64>,

    /// Reporting software name (overrides RPS_SOFTWARE_NAME)
    #[arg(long)]
    software_name: Option<String>,

    /// Reporting software version (overrides RPS_SOFTWARE_VERSION)
    #[arg(long)]
    software_version: Option<String>,

    /// Opaque end-user identifier (overrides RPS_END_USER)
    #[arg(long)]
    end_user: Option<String>,

    /// Observations as IP,EVENT[,REPEAT]; read from stdin when omitted
    observations: Vec<String>,
}

impl Args {
    /// Command-line value for an environment setting, if one was given.
    /// The password is only taken from the environment.
    fn setting(&self, name: &str) -> Option<String> {
        match name {
            "RPS_SERVER" => self.server.clone(),
            "RPS_TRANSPORT" => self.transport.clone(),
            "RPS_USERNAME" => self.username.clone(),
            "RPS_TIMEOUT_SECS" => self.timeout.map(|t| t.to_string()),
            "RPS_SOFTWARE_NAME" => self.software_name.clone(),
            "RPS_SOFTWARE_VERSION" => self.software_version.clone(),
            "RPS_END_USER" => self.end_user.clone(),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config =
        ClientConfig::from_lookup(|name| args.setting(name).or_else(|| std::env::var(name).ok()))?;
    info!(?config, "Loaded configuration");

    let observations = if args.observations.is_empty() {
        read_stdin()?
    } else {
        args.observations
            .iter()
            .map(|o| o.parse::<Observation>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut assembler = config.connect()?;
    let mut rejected = 0usize;
    for observation in &observations {
        if let Err(e) = observation.record(&mut assembler) {
            warn!(address = %observation.address, error = %e, "Skipping observation");
            rejected += 1;
        }
    }

    if assembler.pending() == 0 {
        info!(rejected, "Nothing to report");
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = assembler.flush(true)?;
    match outcome {
        Flush::Sent { reports, size } => {
            info!(
                reports,
                size,
                events = observations.len() - rejected,
                rejected,
                "Done"
            );
            Ok(ExitCode::SUCCESS)
        }
        // The assembler retries once more when it is dropped.
        Flush::Deferred { size } | Flush::Withheld { size } => {
            warn!(size, "Report was not delivered");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_stdin() -> anyhow::Result<Vec<Observation>> {
    let mut observations = Vec::new();
    for line in io::stdin().lock().lines() {
        if let Some(observation) = parse_line(&line?) {
            observations.push(observation?);
        }
    }
    Ok(observations)
}
