//! Aquasync assembly driver (feature-gated).

use aquasync::cx::Cx;
use aquasync::harness::{run_assembly, ArrivalPlan, AssemblyConfig, AssemblyReport};
use clap::{ArgAction, Parser, ValueEnum};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "aquasync",
    version,
    about = "Assemble water molecules from concurrent hydrogen and oxygen workers"
)]
struct Cli {
    /// Number of molecules to assemble; spawns 2k hydrogen and k oxygen workers
    #[arg(short = 'k', long = "molecules", default_value_t = 100)]
    molecules: usize,

    /// Seed for the jitter schedule
    #[arg(long = "seed", default_value_t = 42)]
    seed: u64,

    /// Maximum per-worker start jitter in milliseconds
    #[arg(long = "max-jitter-ms", default_value_t = 100)]
    max_jitter_ms: u64,

    /// Worker arrival plan
    #[arg(long = "arrival", value_enum, default_value_t = ArrivalChoice::Jittered)]
    arrival: ArrivalChoice,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = Format::Human)]
    format: Format,

    /// Log progress events to stderr
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ArrivalChoice {
    Jittered,
    OxygenFirst,
    HydrogenFirst,
    Alternating,
}

impl From<ArrivalChoice> for ArrivalPlan {
    fn from(choice: ArrivalChoice) -> Self {
        match choice {
            ArrivalChoice::Jittered => Self::Jittered,
            ArrivalChoice::OxygenFirst => Self::OxygenFirst,
            ArrivalChoice::HydrogenFirst => Self::HydrogenFirst,
            ArrivalChoice::Alternating => Self::Alternating,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Human,
    Json,
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .with_ansi(false)
            .try_init();
    }

    let config = AssemblyConfig::new(cli.molecules)
        .seed(cli.seed)
        .max_jitter(Duration::from_millis(cli.max_jitter_ms))
        .arrival(cli.arrival.into());
    let cx = Cx::new();

    let report = match run_assembly(&cx, &config) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("aquasync: {err}");
            return ExitCode::FAILURE;
        }
    };

    if write_report(&report, cli.format).is_err() {
        eprintln!("aquasync: failed to write output");
        return ExitCode::FAILURE;
    }

    // A run with cancelled bonds never validated its transcript.
    if report.bonds_cancelled > 0 {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn write_report(report: &AssemblyReport, format: Format) -> io::Result<()> {
    let mut stdout = io::stdout();
    match format {
        Format::Human => writeln!(stdout, "{}", human_format(report)),
        Format::Json => {
            let json = serde_json::to_string(report).map_err(io::Error::other)?;
            writeln!(stdout, "{json}")
        }
        Format::JsonPretty => {
            let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
            writeln!(stdout, "{json}")
        }
    }
}

fn human_format(report: &AssemblyReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Molecules requested: {}", report.molecules_requested));
    lines.push(format!("Seed: {}", report.seed));
    lines.push(format!("Arrival plan: {:?}", report.arrival));
    lines.push(format!("Workers spawned: {}", report.workers_spawned));
    lines.push(format!("Emissions recorded: {}", report.emissions_recorded));
    lines.push(format!("Molecules assembled: {}", report.molecules_assembled));
    lines.push(format!("Trip leaders: {}", report.trip_leaders));
    lines.push(format!("Bonds cancelled: {}", report.bonds_cancelled));
    lines.push(format!("Elapsed: {} ms", report.elapsed_ms));
    match &report.validation {
        Some(summary) => lines.push(format!(
            "Validation: {} triples ({} H, {} O)",
            summary.triples, summary.hydrogens, summary.oxygens
        )),
        None => lines.push("Validation: skipped (run was cancelled)".to_string()),
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquasync::harness::ValidationSummary;

    fn sample_report() -> AssemblyReport {
        AssemblyReport {
            molecules_requested: 2,
            seed: 7,
            arrival: ArrivalPlan::Jittered,
            workers_spawned: 6,
            emissions_recorded: 6,
            molecules_assembled: 2,
            trip_leaders: 2,
            bonds_cancelled: 0,
            elapsed_ms: 12,
            validation: Some(ValidationSummary {
                triples: 2,
                hydrogens: 4,
                oxygens: 2,
            }),
        }
    }

    #[test]
    fn arrival_choices_map_one_to_one() {
        assert_eq!(ArrivalPlan::from(ArrivalChoice::Jittered), ArrivalPlan::Jittered);
        assert_eq!(ArrivalPlan::from(ArrivalChoice::OxygenFirst), ArrivalPlan::OxygenFirst);
        assert_eq!(
            ArrivalPlan::from(ArrivalChoice::HydrogenFirst),
            ArrivalPlan::HydrogenFirst
        );
        assert_eq!(
            ArrivalPlan::from(ArrivalChoice::Alternating),
            ArrivalPlan::Alternating
        );
    }

    #[test]
    fn human_format_reports_validation() {
        let text = human_format(&sample_report());
        assert!(text.contains("Molecules assembled: 2"));
        assert!(text.contains("Validation: 2 triples (4 H, 2 O)"));
    }

    #[test]
    fn human_format_notes_cancelled_runs() {
        let mut report = sample_report();
        report.bonds_cancelled = 3;
        report.validation = None;
        let text = human_format(&report);
        assert!(text.contains("Validation: skipped"));
    }

    #[test]
    fn report_serializes_to_json() {
        let json = serde_json::to_string(&sample_report()).expect("serialize report");
        assert!(json.contains("\"molecules_assembled\":2"));
        assert!(json.contains("\"arrival\":\"Jittered\""));
    }
}
