//! Job dispatch and the daily incremental runner.
//!
//! Every job invocation opens its own store handles through the factory, so a job that fails to
//! connect or aborts leaves the others untouched.

use crate::error::EtlError;
use crate::models::records::{latest_processed_date, Watermark};
use crate::services::job::{DateSelection, JobContext, JobKind, JobReport, JobStatus};
use crate::services::{alerts, energy, program_history, sensor_stats, utilization};
use crate::store::StoreFactory;
use crate::utils::DateSpan;
use chrono::{Duration, NaiveDate};
use log::{debug, error, info, warn};

/// What the daily runner should do given the current watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// Nothing aggregated yet; a full backfill has to run first
    NoWatermark,
    UpToDate { last: NaiveDate },
    Process(DateSpan),
}

/// Resume from the day after the latest processed date, up to and including `today`.
pub fn resolve_range(marks: &[Watermark], today: NaiveDate) -> RangeDecision {
    let Some(last) = latest_processed_date(marks) else {
        return RangeDecision::NoWatermark;
    };
    let from = last + Duration::days(1);
    if from > today {
        RangeDecision::UpToDate { last }
    } else {
        RangeDecision::Process(DateSpan::new(from, today))
    }
}

/// Run one job with fresh connections. Hard failures come back as a `Failed` report.
pub fn run_job(
    factory: &dyn StoreFactory,
    ctx: &JobContext<'_>,
    job: JobKind,
    selection: &DateSelection,
) -> JobReport {
    let result = factory.source().and_then(|mut source| {
        let mut agg = factory.aggregate()?;
        let (source, agg) = (source.as_mut(), agg.as_mut());
        match job {
            JobKind::SensorStats => sensor_stats::run(ctx, source, agg, selection),
            JobKind::Utilization => utilization::run_daily_hours(ctx, source, agg, selection),
            JobKind::UtilizationIntervals => utilization::run_intervals(ctx, source, agg, selection),
            JobKind::ProgramHistory => program_history::run(ctx, source, agg, selection),
            JobKind::Alerts => alerts::run(ctx, source, agg, selection),
            JobKind::Energy => energy::run(ctx, source, agg, selection),
        }
    });
    match result {
        Ok(report) => report,
        Err(e) => {
            error!("{}: aborted: {}", job, e);
            let span = match selection {
                DateSelection::Full => None,
                DateSelection::Single(day) => Some(DateSpan::single(*day)),
                DateSelection::Range(span) => Some(*span),
            };
            JobReport::failed(job, span, &e)
        }
    }
}

/// Run `jobs` one after another; a failing job does not stop the rest.
pub fn run_jobs(
    factory: &dyn StoreFactory,
    ctx: &JobContext<'_>,
    jobs: &[JobKind],
    selection: &DateSelection,
) -> Vec<JobReport> {
    jobs.iter()
        .map(|job| {
            let report = run_job(factory, ctx, *job, selection);
            log_report(&report);
            report
        })
        .collect()
}

pub fn data_status(factory: &dyn StoreFactory) -> Result<Vec<Watermark>, EtlError> {
    factory.aggregate()?.watermarks()
}

/// Process everything between the watermark and `today` with the daily job set.
pub fn run_daily(factory: &dyn StoreFactory, ctx: &JobContext<'_>, today: NaiveDate) -> Result<Vec<JobReport>, EtlError> {
    let marks = data_status(factory)?;
    match resolve_range(&marks, today) {
        RangeDecision::NoWatermark => {
            warn!("daily: no aggregated data yet; run a full backfill for each job first");
            Ok(Vec::new())
        }
        RangeDecision::UpToDate { last } => {
            info!("daily: already up to date (last processed {}, today {})", last, today);
            Ok(Vec::new())
        }
        RangeDecision::Process(span) => {
            info!(
                "daily: processing {} to {} ({} day(s)) with {} job(s)",
                span.from,
                span.to,
                span.num_days(),
                JobKind::DAILY.len()
            );
            let reports = run_jobs(factory, ctx, &JobKind::DAILY, &DateSelection::Range(span));
            let failed = reports.iter().filter(|r| r.status == JobStatus::Failed).count();
            info!("daily: {} job(s) run, {} failed", reports.len(), failed);
            Ok(reports)
        }
    }
}

fn log_report(report: &JobReport) {
    let span = report
        .span
        .map(|s| format!("{}..{}", s.from, s.to))
        .unwrap_or_else(|| "-".to_string());
    match report.status {
        JobStatus::Failed => error!(
            "{}: FAILED for {} ({})",
            report.job,
            span,
            report.error.as_deref().unwrap_or("unknown error")
        ),
        status => info!(
            "{}: {:?} for {} (extracted={}, loaded={}, failed days={})",
            report.job,
            status,
            span,
            report.extracted,
            report.loaded,
            report.failed_dates.len()
        ),
    }
    match serde_json::to_string(report) {
        Ok(json) => debug!("{}: report {}", report.job, json),
        Err(e) => debug!("{}: report not serializable: {}", report.job, e),
    }
}
