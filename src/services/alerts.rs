//! Daily alert counts per category and detail rows for the severe ones.

use crate::engine::alerts::{classify_event, count_by_category, detail_rows, ClassifiedAlarm};
use crate::error::EtlError;
use crate::services::job::{resolve_span, DateSelection, JobContext, JobKind, JobReport, JobRun, JobState};
use crate::store::{AggregateStore, SourceStore, SpanScope};
use crate::utils::TimeWindow;
use log::{debug, info};

pub fn run(
    ctx: &JobContext<'_>,
    source: &mut dyn SourceStore,
    agg: &mut dyn AggregateStore,
    selection: &DateSelection,
) -> Result<JobReport, EtlError> {
    let alarm_var = ctx.config.alarm_variable_id;
    let rules = &ctx.config.alert_rules;
    let mut run = JobRun::new(JobKind::Alerts);

    let Some(span) = resolve_span(selection, source, &SpanScope::Strings { id: alarm_var })? else {
        return Ok(run.nothing_to_do("no alarm payloads in the source"));
    };
    run.start(selection, span);

    run.each_day(span, |run, day| {
        run.enter(JobState::Extracting);
        let events = source.string_events(alarm_var, &TimeWindow::day(day))?;
        run.extracted(events.len());

        run.enter(JobState::Transforming);
        let alarms: Vec<ClassifiedAlarm> = events
            .iter()
            .flat_map(|e| classify_event(e.timestamp, e.as_text(), rules))
            .collect();
        if alarms.is_empty() {
            debug!("alerts: no decodable alarms on {}", day);
            return Ok(());
        }
        let counts = count_by_category(day, &alarms);
        let details = detail_rows(&alarms);
        run.transformed(counts.len() + details.len());

        run.enter(JobState::Loading);
        let load = agg.load_alerts(&counts, &details)?;
        run.loaded(load.counted + load.appended);
        info!(
            "alerts: {} -> {} alarm(s), {} category row(s), {} detail row(s)",
            day,
            alarms.len(),
            load.counted,
            load.appended
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
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    const ALARMS: i32 = 447;

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, day, h, 0, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 2, day).unwrap()
    }

    fn source() -> MemorySource {
        let mut src = MemorySource::default();
        src.push_text(ALARMS, at(22, 8), r#"[["E1","Emergency stop"],["W7","Door warning"]]"#);
        src.push_text(ALARMS, at(22, 9), "[]");
        src.push_text(ALARMS, at(22, 10), "garbage");
        src.push_text(ALARMS, at(22, 11), r#"[["E2","Spindle fault"],["I1","Cycle complete"]]"#);
        src.push_text(ALARMS, at(23, 11), r#"[["E2","Spindle fault"]]"#);
        src
    }

    fn ctx(config: &Config) -> JobContext<'_> {
        JobContext {
            config,
            now: at(24, 0),
        }
    }

    #[test]
    fn counts_every_category_and_keeps_severe_details() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut agg = MemoryAggregate::default();
        let report = run(&ctx(&config), &mut source(), &mut agg, &DateSelection::Single(d(22))).unwrap();
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(report.extracted, 4);

        let count = |kind: &str| agg.alert_counts.get(&(d(22), kind.to_string())).copied();
        assert_eq!(count("emergency"), Some(1));
        assert_eq!(count("error"), Some(1));
        assert_eq!(count("warning"), Some(1));
        assert_eq!(count("other"), Some(1));

        assert_eq!(agg.details.len(), 2);
        assert_eq!(agg.details[0].alarm_code.as_deref(), Some("E2"));
        assert_eq!(agg.details[1].alert_type, "emergency");
    }

    #[test]
    fn counts_are_upserted_but_details_append() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut src = source();
        let mut agg = MemoryAggregate::default();
        run(&ctx(&config), &mut src, &mut agg, &DateSelection::Full).unwrap();
        run(&ctx(&config), &mut src, &mut agg, &DateSelection::Full).unwrap();

        assert_eq!(agg.alert_counts.get(&(d(23), "error".to_string())), Some(&1));
        assert_eq!(agg.alert_counts.len(), 5);
        // append-only: a second run duplicates detail rows
        assert_eq!(agg.details.len(), 6);
    }

    #[test]
    fn failed_load_is_recorded_per_day() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut agg = MemoryAggregate {
            fail_writes: true,
            ..Default::default()
        };
        let report = run(&ctx(&config), &mut source(), &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.failed_dates, vec![d(22), d(23)]);
    }

    #[test]
    fn failed_detail_insert_rolls_back_the_day() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut src = MemorySource::default();
        src.push_text(ALARMS, at(22, 8), r#"[["E1","Emergency stop"]]"#);
        let mut agg = MemoryAggregate {
            fail_details: true,
            ..Default::default()
        };
        let report = run(&ctx(&config), &mut src, &mut agg, &DateSelection::Single(d(22))).unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.failed_dates, vec![d(22)]);
        assert!(agg.alert_counts.is_empty());
        assert!(agg.details.is_empty());
    }
}
