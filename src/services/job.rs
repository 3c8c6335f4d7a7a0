//! Lifecycle shared by every ETL job: resolve the date range, then extract, transform and load,
//! usually one calendar day at a time with failures isolated per day.

use crate::config::Config;
use crate::error::EtlError;
use crate::store::{SourceStore, SpanScope};
use crate::utils::DateSpan;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

/// Failed dates listed in the final summary before it is cut short.
const LISTED_FAILURES: usize = 10;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum JobKind {
    SensorStats,
    Utilization,
    UtilizationIntervals,
    ProgramHistory,
    Alerts,
    Energy,
}

impl JobKind {
    /// Jobs the daily runner invokes, in order.
    pub const DAILY: [JobKind; 5] = [
        JobKind::SensorStats,
        JobKind::Utilization,
        JobKind::ProgramHistory,
        JobKind::Alerts,
        JobKind::Energy,
    ];

    pub const ALL: [JobKind; 6] = [
        JobKind::SensorStats,
        JobKind::Utilization,
        JobKind::UtilizationIntervals,
        JobKind::ProgramHistory,
        JobKind::Alerts,
        JobKind::Energy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::SensorStats => "sensor-stats",
            JobKind::Utilization => "utilization",
            JobKind::UtilizationIntervals => "utilization-intervals",
            JobKind::ProgramHistory => "program-history",
            JobKind::Alerts => "alerts",
            JobKind::Energy => "energy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        JobKind::ALL.into_iter().find(|k| k.name() == s)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which days a job invocation covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DateSelection {
    /// Everything the source holds for the job's signal
    Full,
    Single(NaiveDate),
    /// Inclusive on both ends
    Range(DateSpan),
}

fn parse_date(s: &str) -> Result<NaiveDate, EtlError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| EtlError::InvalidArgument(format!("{} is not a YYYY-MM-DD date", s)))
}

impl DateSelection {
    /// Zero positional dates mean a full backfill, one a single day, two an inclusive range.
    pub fn from_args(args: &[String]) -> Result<Self, EtlError> {
        match args {
            [] => Ok(DateSelection::Full),
            [day] => Ok(DateSelection::Single(parse_date(day)?)),
            [from, to] => {
                let (from, to) = (parse_date(from)?, parse_date(to)?);
                if from > to {
                    return Err(EtlError::InvalidArgument(format!("range start {} is after its end {}", from, to)));
                }
                Ok(DateSelection::Range(DateSpan::new(from, to)))
            }
            _ => Err(EtlError::InvalidArgument(format!(
                "expected at most two dates, got {}",
                args.len()
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl JobState {
    pub fn can_move_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, Transforming)
                | (Transforming, Loading)
                // next day of a per-day loop
                | (Loading, Extracting)
                | (Transforming, Extracting)
                | (Extracting, Extracting)
                | (Idle, Done)
                | (Loading, Done)
                | (Transforming, Done)
                | (Extracting, Done)
                | (_, Failed)
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    /// Every day loaded
    Done,
    /// Some days failed, the rest loaded
    Partial,
    /// Nothing was loaded for the range
    Empty,
    /// Nothing could be loaded
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job: JobKind,
    pub span: Option<DateSpan>,
    pub status: JobStatus,
    pub extracted: usize,
    pub transformed: usize,
    pub loaded: usize,
    pub failed_dates: Vec<NaiveDate>,
    pub error: Option<String>,
}

impl JobReport {
    pub fn failed(job: JobKind, span: Option<DateSpan>, err: &EtlError) -> Self {
        JobReport {
            job,
            span,
            status: JobStatus::Failed,
            extracted: 0,
            transformed: 0,
            loaded: 0,
            failed_dates: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Explicit inputs of one job invocation.
#[derive(Debug, Clone, Copy)]
pub struct JobContext<'a> {
    pub config: &'a Config,
    /// Upper bound for open-ended state spans
    pub now: DateTime<Utc>,
}

/// Concrete span for `selection`; `None` when a full backfill finds no source rows.
pub fn resolve_span(
    selection: &DateSelection,
    source: &mut dyn SourceStore,
    scope: &SpanScope,
) -> Result<Option<DateSpan>, EtlError> {
    match selection {
        DateSelection::Full => source.date_span(scope),
        DateSelection::Single(day) => Ok(Some(DateSpan::single(*day))),
        DateSelection::Range(span) => Ok(Some(*span)),
    }
}

pub fn describe(selection: &DateSelection, span: &DateSpan) -> String {
    match selection {
        DateSelection::Full => format!("full backfill from {} to {}", span.from, span.to),
        DateSelection::Single(day) => format!("only {}", day),
        DateSelection::Range(_) => format!("from {} to {}", span.from, span.to),
    }
}

/// Book-keeping for one running job.
#[derive(Debug)]
pub struct JobRun {
    job: JobKind,
    state: JobState,
    span: Option<DateSpan>,
    days: usize,
    extracted: usize,
    transformed: usize,
    loaded: usize,
    failed_dates: Vec<NaiveDate>,
}

impl JobRun {
    pub fn new(job: JobKind) -> Self {
        JobRun {
            job,
            state: JobState::Idle,
            span: None,
            days: 0,
            extracted: 0,
            transformed: 0,
            loaded: 0,
            failed_dates: Vec::new(),
        }
    }

    pub fn enter(&mut self, next: JobState) {
        if !self.state.can_move_to(next) {
            warn!("{}: unexpected state change {:?} -> {:?}", self.job, self.state, next);
        }
        debug!("{}: {:?} -> {:?}", self.job, self.state, next);
        self.state = next;
    }

    pub fn start(&mut self, selection: &DateSelection, span: DateSpan) {
        info!("{}: started for {}", self.job, describe(selection, &span));
        self.span = Some(span);
    }

    pub fn extracted(&mut self, n: usize) {
        self.extracted += n;
    }

    pub fn transformed(&mut self, n: usize) {
        self.transformed += n;
    }

    pub fn loaded(&mut self, n: usize) {
        self.loaded += n;
    }

    /// Run `step` for every day of `span`. A failing day is logged and recorded; the loop
    /// carries on with the next day.
    pub fn each_day<F>(&mut self, span: DateSpan, mut step: F)
    where
        F: FnMut(&mut JobRun, NaiveDate) -> Result<(), EtlError>,
    {
        for day in span.days() {
            self.days += 1;
            if let Err(e) = step(self, day) {
                warn!("{}: {} failed: {}", self.job, day, e);
                self.failed_dates.push(day);
            }
        }
    }

    /// One combined step over the whole span; a failure fails the job.
    pub fn whole_span<F>(&mut self, span: DateSpan, step: F) -> Result<(), EtlError>
    where
        F: FnOnce(&mut JobRun, DateSpan) -> Result<(), EtlError>,
    {
        self.days += span.num_days() as usize;
        step(self, span)
    }

    pub fn finish(mut self) -> JobReport {
        let status = if !self.failed_dates.is_empty() && self.failed_dates.len() >= self.days {
            JobStatus::Failed
        } else if !self.failed_dates.is_empty() {
            JobStatus::Partial
        } else if self.loaded == 0 {
            JobStatus::Empty
        } else {
            JobStatus::Done
        };
        self.enter(if status == JobStatus::Failed { JobState::Failed } else { JobState::Done });

        match status {
            JobStatus::Empty => warn!(
                "{}: nothing loaded for the range (extracted={})",
                self.job, self.extracted
            ),
            _ => info!(
                "{}: finished (extracted={}, transformed={}, loaded={})",
                self.job, self.extracted, self.transformed, self.loaded
            ),
        }
        if !self.failed_dates.is_empty() {
            warn!(
                "{}: {} of {} day(s) failed: {}",
                self.job,
                self.failed_dates.len(),
                self.days,
                summarize_dates(&self.failed_dates)
            );
        }

        let error = (status == JobStatus::Failed).then(|| format!("all {} day(s) failed", self.days));
        JobReport {
            job: self.job,
            span: self.span,
            status,
            extracted: self.extracted,
            transformed: self.transformed,
            loaded: self.loaded,
            failed_dates: self.failed_dates,
            error,
        }
    }

    /// Report for a job aborted outside the per-day loop.
    pub fn fail(mut self, err: &EtlError) -> JobReport {
        self.enter(JobState::Failed);
        log::error!("{}: failed: {}", self.job, err);
        let mut report = JobReport::failed(self.job, self.span, err);
        report.extracted = self.extracted;
        report.transformed = self.transformed;
        report.loaded = self.loaded;
        report.failed_dates = self.failed_dates;
        report
    }

    /// Report for a range with nothing to do.
    pub fn nothing_to_do(mut self, reason: &str) -> JobReport {
        warn!("{}: {}", self.job, reason);
        self.enter(JobState::Done);
        JobReport {
            job: self.job,
            span: self.span,
            status: JobStatus::Empty,
            extracted: 0,
            transformed: 0,
            loaded: 0,
            failed_dates: Vec::new(),
            error: None,
        }
    }
}

/// `a, b, c` with at most ten dates, then `...`.
pub fn summarize_dates(dates: &[NaiveDate]) -> String {
    let mut listed: Vec<String> = dates.iter().take(LISTED_FAILURES).map(|d| d.to_string()).collect();
    if dates.len() > LISTED_FAILURES {
        listed.push("...".to_string());
    }
    listed.join(", ")
}
