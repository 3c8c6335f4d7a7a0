//! Command line: `machine-etl [--env-file PATH] <command> [FROM [TO]]`.

use crate::services::job::{DateSelection, JobKind};
use std::ffi::OsString;
use std::path::PathBuf;

pub const USAGE: &str = "usage: machine-etl [--env-file PATH] <command> [FROM [TO]]

commands:
  sensor-stats | utilization | utilization-intervals | program-history | alerts | energy
                 run one job; no dates = everything in the source, FROM = one day, FROM TO = inclusive range
  all            run every job over the same dates
  daily          resume all daily jobs from the day after the last processed date
  status         print the aggregated date range per table";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Job(JobKind, DateSelection),
    All(DateSelection),
    Daily,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub env_file: Option<PathBuf>,
    pub command: Command,
}

fn set_env_file(slot: &mut Option<PathBuf>, value: Option<OsString>) -> Result<(), String> {
    if slot.is_some() {
        return Err("`--env-file` provided more than once".to_string());
    }
    match value {
        Some(path) if !path.is_empty() => {
            *slot = Some(PathBuf::from(path));
            Ok(())
        }
        _ => Err("`--env-file` requires a path argument".to_string()),
    }
}

/// Parse everything after the program name.
pub fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<Cli, String> {
    let mut args = args.into_iter();
    let mut env_file: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => set_env_file(&mut env_file, args.next())?,
            Some(s) if s.starts_with("--env-file=") => {
                set_env_file(&mut env_file, Some(OsString::from(&s["--env-file=".len()..])))?
            }
            Some("--") => {
                for rest in args.by_ref() {
                    positional.push(rest.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?);
                }
            }
            Some(s) if s.starts_with("--") => return Err(format!("unrecognised option: {}", s)),
            Some(s) => positional.push(s.to_string()),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    let Some((name, dates)) = positional.split_first() else {
        return Err("missing command".to_string());
    };
    let selection = || DateSelection::from_args(dates).map_err(|e| e.to_string());
    let no_dates = |cmd: Command| {
        if dates.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("`{}` takes no dates", name))
        }
    };
    let command = match name.as_str() {
        "all" => Command::All(selection()?),
        "daily" => no_dates(Command::Daily)?,
        "status" => no_dates(Command::Status)?,
        job => match JobKind::parse(job) {
            Some(kind) => Command::Job(kind, selection()?),
            None => return Err(format!("unknown command: {}", job)),
        },
    };
    Ok(Cli { env_file, command })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DateSpan;
    use chrono::NaiveDate;

    fn parse(args: &[&str]) -> Result<Cli, String> {
        parse_args(args.iter().map(OsString::from))
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 2, day).unwrap()
    }

    #[test]
    fn job_with_dates() {
        assert_eq!(parse(&["alerts"]).unwrap().command, Command::Job(JobKind::Alerts, DateSelection::Full));
        assert_eq!(
            parse(&["energy", "2022-02-20"]).unwrap().command,
            Command::Job(JobKind::Energy, DateSelection::Single(d(20)))
        );
        let cli = parse(&["--env-file", "prod.env", "all", "2022-02-01", "2022-02-20"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(cli.command, Command::All(DateSelection::Range(DateSpan::new(d(1), d(20)))));
    }

    #[test]
    fn runner_commands_take_no_dates() {
        assert_eq!(parse(&["daily", "--env-file=x.env"]).unwrap().command, Command::Daily);
        assert_eq!(parse(&["status"]).unwrap().command, Command::Status);
        assert!(parse(&["daily", "2022-02-20"]).is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["vacuum"]).is_err());
        assert!(parse(&["--verbose", "alerts"]).is_err());
        assert!(parse(&["alerts", "20-02-2022"]).is_err());
        assert!(parse(&["alerts", "2022-02-20", "2022-02-19"]).is_err());
        assert!(parse(&["--env-file"]).is_err());
        assert!(parse(&["--env-file=a", "--env-file=b", "alerts"]).is_err());
    }
}
