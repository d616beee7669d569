use anyhow::Context;
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::Parser;

mod calendar;
mod config;
mod delta;
mod error;
mod loader;
mod models;
mod pipeline;
mod ranking;
mod reconcile;
mod report;
mod rollup;

use config::{RunContext, Settings};

#[derive(Parser, Debug)]
#[command(name = "wealth-sales-report")]
#[command(about = "Sales and commission reports for wealth-management branches", long_about = None)]
struct Cli {
    /// Report date; snapshot files are looked up relative to it
    #[arg(value_name = "YYYYMMDD", value_parser = parse_date_arg)]
    date: NaiveDate,
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    calendar::parse_report_date(raw).map_err(|e| e.to_string())
}

/// Usage errors exit with status 1; help and version output keep clap's behavior.
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = parse_cli();
    let settings = Settings::from_env().context("failed to read settings from the environment")?;
    let ctx = RunContext::new(settings, cli.date).context("failed to prepare the report run")?;

    for kind in &ctx.reports {
        let written = pipeline::run(&ctx, *kind)
            .with_context(|| format!("failed to generate the {kind} report"))?;
        for path in written {
            println!("Report written to {}.", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_takes_exactly_one_date() {
        let cli = Cli::try_parse_from(["wealth-sales-report", "20240315"]).unwrap();
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        assert!(Cli::try_parse_from(["wealth-sales-report"]).is_err());
        assert!(Cli::try_parse_from(["wealth-sales-report", "20240315", "20240316"]).is_err());
        assert!(Cli::try_parse_from(["wealth-sales-report", "2024-03-15"]).is_err());
        assert!(Cli::try_parse_from(["wealth-sales-report", "20240230"]).is_err());
    }
}
