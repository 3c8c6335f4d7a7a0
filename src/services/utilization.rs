//! Machine utilization from log activity gaps.
//!
//! Any row in either log table counts as activity. Two loads share the same per-day
//! segmentation: whole-day running/down hours (upserted by date) and the interval-level
//! timeline (delete-then-insert by derived date).

use crate::engine::segment::{classify_day, daily_utilization, DayActivity, MachineState};
use crate::error::EtlError;
use crate::services::job::{resolve_span, DateSelection, JobContext, JobKind, JobReport, JobRun, JobState};
use crate::store::{AggregateStore, SourceStore, SpanScope};
use crate::utils::TimeWindow;
use chrono::{Duration, NaiveDate};
use log::info;

/// Activity of `day` plus its neighbours across both midnights. Only a neighbour within `gap` of
/// midnight can join a block, so the lookups stop there.
fn extract_day(source: &mut dyn SourceStore, day: NaiveDate, gap: Duration) -> Result<DayActivity, EtlError> {
    let window = TimeWindow::day(day);
    let events = source.activity_times(&window)?;
    let carry_in = source.activity_before(window.start, gap)?;
    let carry_out = source.activity_from(window.end, gap)?;
    Ok(DayActivity::new(day, carry_in, events, carry_out))
}

/// Daily running vs. planned-down hours.
pub fn run_daily_hours(
    ctx: &JobContext<'_>,
    source: &mut dyn SourceStore,
    agg: &mut dyn AggregateStore,
    selection: &DateSelection,
) -> Result<JobReport, EtlError> {
    let gap = ctx.config.session_gap();
    let mut run = JobRun::new(JobKind::Utilization);

    let Some(span) = resolve_span(selection, source, &SpanScope::AllActivity)? else {
        return Ok(run.nothing_to_do("no activity in the source"));
    };
    run.start(selection, span);

    run.each_day(span, |run, day| {
        run.enter(JobState::Extracting);
        let activity = extract_day(source, day, gap)?;
        run.extracted(activity.events.len());

        run.enter(JobState::Transforming);
        let row = daily_utilization(&activity, gap);
        run.transformed(1);

        run.enter(JobState::Loading);
        run.loaded(agg.upsert_daily_utilization(std::slice::from_ref(&row))?);
        info!(
            "utilization: {} running={}h down={}h ({} event(s))",
            day,
            row.running_hours,
            row.planned_down_hours,
            activity.events.len()
        );
        Ok(())
    });

    Ok(run.finish())
}

/// Running/down interval timeline, one day per transaction.
pub fn run_intervals(
    ctx: &JobContext<'_>,
    source: &mut dyn SourceStore,
    agg: &mut dyn AggregateStore,
    selection: &DateSelection,
) -> Result<JobReport, EtlError> {
    let gap = ctx.config.session_gap();
    let mut run = JobRun::new(JobKind::UtilizationIntervals);

    let Some(span) = resolve_span(selection, source, &SpanScope::AllActivity)? else {
        return Ok(run.nothing_to_do("no activity in the source"));
    };
    run.start(selection, span);

    run.each_day(span, |run, day| {
        run.enter(JobState::Extracting);
        let activity = extract_day(source, day, gap)?;
        run.extracted(activity.events.len());

        run.enter(JobState::Transforming);
        let intervals = classify_day(&activity, gap);
        run.transformed(intervals.len());

        run.enter(JobState::Loading);
        let outcome = agg.replace_utilization_intervals(&intervals)?;
        run.loaded(outcome.inserted);
        let running = intervals.iter().filter(|i| i.state == MachineState::Running).count();
        info!(
            "utilization-intervals: {} replaced {} row(s) with {} ({} running)",
            day, outcome.deleted, outcome.inserted, running
        );
        Ok(())
    });

    Ok(run.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::job::JobStatus;
    use crate::store::memory::{MemoryAggregate, MemorySource};
    use crate::utils::DateSpan;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, day, h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 2, day).unwrap()
    }

    /// Two hours of activity every five minutes from 08:00 on the 20th, plus a session that
    /// crosses midnight from the 21st into the 22nd.
    fn source() -> MemorySource {
        let mut src = MemorySource::default();
        for i in 0..=24 {
            src.push_float(1, at(20, 8, 0) + Duration::minutes(5 * i), Some(1.0));
        }
        for i in 0..=6 {
            src.push_text(447, at(21, 23, 30) + Duration::minutes(10 * i), "[]");
        }
        src
    }

    fn run_hours(src: &mut MemorySource, agg: &mut MemoryAggregate, sel: DateSelection) -> JobReport {
        let config = Config::from_lookup(|_| None).unwrap();
        let ctx = JobContext {
            config: &config,
            now: at(25, 0, 0),
        };
        run_daily_hours(&ctx, src, agg, &sel).unwrap()
    }

    #[test]
    fn hours_cover_each_day_of_range() {
        let mut agg = MemoryAggregate::default();
        let report = run_hours(&mut source(), &mut agg, DateSelection::Range(DateSpan::new(d(19), d(23))));
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(agg.daily.len(), 5);

        assert_eq!(agg.daily[&d(19)].running_hours, 0.0);
        assert_eq!(agg.daily[&d(19)].planned_down_hours, 24.0);
        assert_eq!(agg.daily[&d(20)].running_hours, 2.0);
        assert_eq!(agg.daily[&d(20)].planned_down_hours, 22.0);
        // 23:30 -> midnight, then midnight -> 00:30
        assert_eq!(agg.daily[&d(21)].running_hours, 0.5);
        assert_eq!(agg.daily[&d(22)].running_hours, 0.5);
        for row in agg.daily.values() {
            assert!((row.running_hours + row.planned_down_hours - 24.0).abs() < 0.01);
        }
    }

    #[test]
    fn quiet_days_still_load_full_down_time() {
        let mut agg = MemoryAggregate::default();
        let report = run_hours(&mut source(), &mut agg, DateSelection::Range(DateSpan::new(d(24), d(25))));
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(report.extracted, 0);
        assert_eq!(report.loaded, 2);
        assert_eq!(agg.daily[&d(24)].planned_down_hours, 24.0);
        assert_eq!(agg.daily[&d(25)].running_hours, 0.0);
    }

    #[test]
    fn hours_upsert_is_idempotent() {
        let mut src = source();
        let mut agg = MemoryAggregate::default();
        run_hours(&mut src, &mut agg, DateSelection::Full);
        let first = agg.daily.clone();
        run_hours(&mut src, &mut agg, DateSelection::Full);
        assert_eq!(first, agg.daily);
        assert_eq!(first.keys().copied().collect::<Vec<_>>(), vec![d(20), d(21), d(22)]);
    }

    #[test]
    fn intervals_rerun_keeps_neighbouring_days() {
        let config = Config::from_lookup(|_| None).unwrap();
        let ctx = JobContext {
            config: &config,
            now: at(25, 0, 0),
        };
        let mut src = source();
        let mut agg = MemoryAggregate::default();

        run_intervals(&ctx, &mut src, &mut agg, &DateSelection::Full).unwrap();
        let days: Vec<_> = agg.intervals.iter().map(|i| i.date).collect();
        assert!(days.contains(&d(20)) && days.contains(&d(21)) && days.contains(&d(22)));
        let total_before = agg.intervals.len();

        let report = run_intervals(&ctx, &mut src, &mut agg, &DateSelection::Single(d(21))).unwrap();
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(agg.intervals.len(), total_before);

        for day in [d(20), d(21), d(22)] {
            let covered: Duration = agg
                .intervals
                .iter()
                .filter(|i| i.date == day)
                .map(|i| i.duration())
                .sum();
            assert_eq!(covered, Duration::days(1), "{}", day);
        }
    }

    #[test]
    fn unreachable_source_fails_the_job() {
        let mut src = source();
        src.unreachable = true;
        let config = Config::from_lookup(|_| None).unwrap();
        let ctx = JobContext {
            config: &config,
            now: at(25, 0, 0),
        };
        let mut agg = MemoryAggregate::default();
        assert!(run_daily_hours(&ctx, &mut src, &mut agg, &DateSelection::Full).is_err());
        let report = run_daily_hours(&ctx, &mut src, &mut agg, &DateSelection::Single(d(20))).unwrap();
        assert_eq!(report.status, JobStatus::Failed);
    }
}
