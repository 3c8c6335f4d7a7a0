//! Seconds spent in each CNC program per day.
//!
//! The program variable reports the active program number whenever it changes. The state in
//! effect when the range opens is carried in from the last reading before it; every reading
//! holds until the next one and the last until the range end (never past "now").

use crate::config::PROGRAM_VALUE_BOUNDS;
use crate::engine::segment::{day_pieces, hold_until_next};
use crate::error::EtlError;
use crate::models::records::ProgramUsage;
use crate::services::job::{resolve_span, DateSelection, JobContext, JobKind, JobReport, JobRun, JobState};
use crate::store::{AggregateStore, SourceStore, SpanScope};
use crate::utils::TimeWindow;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::info;
use std::collections::BTreeMap;

/// Program number of a reading, `None` outside the valid range.
fn program_of(value: Option<f64>) -> Option<i32> {
    value
        .filter(|v| v.is_finite() && PROGRAM_VALUE_BOUNDS.contains(*v))
        .map(|v| v.round() as i32)
}

/// Per-day totals of the held program spans inside `window`.
pub fn program_usage(prior: Option<i32>, changes: &[(DateTime<Utc>, i32)], window: &TimeWindow) -> Vec<ProgramUsage> {
    let mut totals: BTreeMap<(NaiveDate, i32), Duration> = BTreeMap::new();
    for span in hold_until_next(prior, changes, window) {
        for (date, start, end) in day_pieces(span.start, span.end) {
            *totals.entry((date, span.value)).or_insert_with(Duration::zero) += end - start;
        }
    }
    totals
        .into_iter()
        .map(|((date, program_id), held)| ProgramUsage {
            date,
            program_id,
            duration_seconds: held.num_seconds(),
        })
        .filter(|row| row.duration_seconds > 0)
        .collect()
}

pub fn run(
    ctx: &JobContext<'_>,
    source: &mut dyn SourceStore,
    agg: &mut dyn AggregateStore,
    selection: &DateSelection,
) -> Result<JobReport, EtlError> {
    let program_var = ctx.config.program_variable_id;
    let mut run = JobRun::new(JobKind::ProgramHistory);

    let scope = SpanScope::Float {
        ids: vec![program_var],
        bounds: Some(PROGRAM_VALUE_BOUNDS),
    };
    let Some(span) = resolve_span(selection, source, &scope)? else {
        return Ok(run.nothing_to_do("no program readings in the source"));
    };
    run.start(selection, span);

    let full = span.window();
    let window = TimeWindow::new(full.start, full.end.min(ctx.now));
    if window.is_empty() {
        return Ok(run.nothing_to_do("range starts in the future"));
    }

    let outcome = run.whole_span(span, |run, _| {
        run.enter(JobState::Extracting);
        let changes: Vec<(DateTime<Utc>, i32)> = source
            .float_events(&[program_var], &window)?
            .into_iter()
            .filter_map(|e| program_of(e.as_f64()).map(|p| (e.timestamp, p)))
            .collect();
        run.extracted(changes.len());
        if changes.is_empty() {
            return Ok(());
        }
        let prior = source
            .last_float_before(program_var, window.start, Some(PROGRAM_VALUE_BOUNDS))?
            .and_then(|e| program_of(e.as_f64()));

        run.enter(JobState::Transforming);
        let rows = program_usage(prior, &changes, &window);
        run.transformed(rows.len());

        run.enter(JobState::Loading);
        let written = agg.upsert_program_usage(&rows)?;
        run.loaded(written);
        info!(
            "program-history: {} change(s) -> {} (day, program) row(s), carried-in program {:?}",
            changes.len(),
            written,
            prior
        );
        Ok(())
    });

    match outcome {
        Ok(()) => Ok(run.finish()),
        Err(e) => Ok(run.fail(&e)),
    }
}
