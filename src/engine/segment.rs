//! Gap/session segmentation of event timestamps.
//!
//! Consecutive events no more than `max_gap` apart belong to the same activity block. A block's
//! running time is `last_event - first_event`; time after the last event of a block is not
//! counted, since no event means no confirmed activity. Everything a day's running blocks do not
//! cover is down time, so running and down always add up to the whole day.

use crate::models::records::DailyUtilization;
use crate::utils::{day_end, day_start, hours, round_to, TimeWindow};
use chrono::{DateTime, Duration, NaiveDate, Utc};

pub const DEFAULT_SESSION_GAP_SECS: i64 = 600;
pub const HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MachineState {
    Running,
    Down,
    /// Reserved for states that are neither confirmed activity nor idle time
    Other,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Running => "running",
            MachineState::Down => "down",
            MachineState::Other => "other",
        }
    }
}

/// A maximal run of events where each event follows the previous by at most the gap threshold.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Block {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub events: usize,
}

impl Block {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A span attributed to one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: MachineState,
}

impl Interval {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn hours(&self) -> f64 {
        hours(self.duration())
    }
}

/// Partition ascending timestamps into maximal blocks.
///
/// A new block starts at the first event and at every event whose predecessor is more than
/// `max_gap` earlier. A gap of exactly `max_gap` keeps the block open.
pub fn find_blocks(times: &[DateTime<Utc>], max_gap: Duration) -> Vec<Block> {
    debug_assert!(times.windows(2).all(|w| w[0] <= w[1]), "timestamps must be sorted");

    let mut blocks: Vec<Block> = Vec::new();
    let Some(&first) = times.first() else {
        return blocks;
    };

    let mut current = Block {
        start: first,
        end: first,
        events: 1,
    };
    for &ts in &times[1..] {
        if ts - current.end > max_gap {
            blocks.push(current);
            current = Block {
                start: ts,
                end: ts,
                events: 1,
            };
        } else {
            current.end = ts;
            current.events += 1;
        }
    }
    blocks.push(current);
    blocks
}

/// Non-empty `(date, start, end)` pieces of `[start, end)`, cut at every midnight.
pub fn day_pieces(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(NaiveDate, DateTime<Utc>, DateTime<Utc>)> {
    let mut pieces = Vec::new();
    for date in start.date_naive().iter_days() {
        let piece_start = start.max(day_start(date));
        if piece_start >= end {
            break;
        }
        pieces.push((date, piece_start, end.min(day_end(date))));
    }
    pieces
}

/// Split `[start, end]` at every midnight it crosses, one piece per calendar day.
///
/// A zero-length span yields exactly one zero-length piece on its own day.
pub fn split_by_day(start: DateTime<Utc>, end: DateTime<Utc>, state: MachineState) -> Vec<Interval> {
    if end <= start {
        return vec![Interval {
            date: start.date_naive(),
            start,
            end: start,
            state,
        }];
    }
    day_pieces(start, end)
        .into_iter()
        .map(|(date, start, end)| Interval { date, start, end, state })
        .collect()
}

/// Everything known about activity around one calendar day.
///
/// `carry_in` is the last event before the day and `carry_out` the first event after it; they
/// let blocks that cross midnight be clipped at the boundary instead of cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayActivity {
    pub day: NaiveDate,
    pub carry_in: Option<DateTime<Utc>>,
    pub events: Vec<DateTime<Utc>>,
    pub carry_out: Option<DateTime<Utc>>,
}

impl DayActivity {
    /// Builds the day view, dropping events outside the day and sorting the rest.
    pub fn new(
        day: NaiveDate,
        carry_in: Option<DateTime<Utc>>,
        mut events: Vec<DateTime<Utc>>,
        carry_out: Option<DateTime<Utc>>,
    ) -> Self {
        let window = TimeWindow::day(day);
        events.retain(|ts| window.contains(*ts));
        events.sort_unstable();
        DayActivity {
            day,
            carry_in: carry_in.filter(|ts| *ts < window.start),
            events,
            carry_out: carry_out.filter(|ts| *ts >= window.end),
        }
    }

    fn timeline(&self) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(self.events.len() + 2);
        times.extend(self.carry_in);
        times.extend(self.events.iter().copied());
        times.extend(self.carry_out);
        times
    }
}

/// Running intervals of one day, clipped to the day.
pub fn running_intervals(activity: &DayActivity, max_gap: Duration) -> Vec<Interval> {
    find_blocks(&activity.timeline(), max_gap)
        .into_iter()
        .flat_map(|b| split_by_day(b.start, b.end, MachineState::Running))
        .filter(|piece| piece.date == activity.day)
        .collect()
}

/// Running intervals plus the down intervals that fill the rest of the day.
///
/// The result is ordered by start time and covers `[day 00:00, day+1 00:00)` without overlap.
/// Zero-length running blocks (a lone event) cover no time and are left out, so no two down
/// intervals are adjacent.
pub fn classify_day(activity: &DayActivity, max_gap: Duration) -> Vec<Interval> {
    let window = TimeWindow::day(activity.day);
    let running: Vec<Interval> = running_intervals(activity, max_gap)
        .into_iter()
        .filter(|i| i.end > i.start)
        .collect();

    let mut out = Vec::with_capacity(running.len() * 2 + 1);
    let mut cursor = window.start;
    for interval in running {
        if interval.start > cursor {
            out.push(Interval {
                date: activity.day,
                start: cursor,
                end: interval.start,
                state: MachineState::Down,
            });
        }
        cursor = cursor.max(interval.end);
        out.push(interval);
    }
    if window.end > cursor {
        out.push(Interval {
            date: activity.day,
            start: cursor,
            end: window.end,
            state: MachineState::Down,
        });
    }
    out
}

/// Whole-day running/down hours, rounded to two decimals.
///
/// Down hours are derived from the rounded running hours, so the pair always sums to 24.
pub fn daily_utilization(activity: &DayActivity, max_gap: Duration) -> DailyUtilization {
    let running_ms: i64 = running_intervals(activity, max_gap)
        .iter()
        .map(|i| i.duration().num_milliseconds())
        .sum();
    let running_hours = round_to(running_ms as f64 / 3_600_000.0, 2).clamp(0.0, HOURS_PER_DAY);
    DailyUtilization {
        date: activity.day,
        running_hours,
        planned_down_hours: round_to(HOURS_PER_DAY - running_hours, 2),
    }
}

/// A value held from `start` until `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldSpan<T> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: T,
}

/// State-change segmentation: every change holds until the next one, the last until the
/// window end.
///
/// `prior` is the state in effect at the window start (from before the window). Changes outside
/// the window are ignored. Spans never extend past the window and empty spans are dropped.
pub fn hold_until_next<T: Clone>(
    prior: Option<T>,
    changes: &[(DateTime<Utc>, T)],
    window: &TimeWindow,
) -> Vec<HeldSpan<T>> {
    let mut points: Vec<(DateTime<Utc>, T)> = Vec::with_capacity(changes.len() + 1);
    if let Some(value) = prior {
        points.push((window.start, value));
    }
    points.extend(changes.iter().filter(|(ts, _)| window.contains(*ts)).cloned());
    points.sort_by_key(|(ts, _)| *ts);

    let mut spans = Vec::with_capacity(points.len());
    for (i, (start, value)) in points.iter().enumerate() {
        let end = points.get(i + 1).map(|(next, _)| *next).unwrap_or(window.end).min(window.end);
        if end > *start {
            spans.push(HeldSpan {
                start: *start,
                end,
                value: value.clone(),
            });
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn gap() -> Duration {
        Duration::seconds(DEFAULT_SESSION_GAP_SECS)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 2, 23).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, 23, h, m, s).unwrap()
    }

    #[test]
    fn gap_above_threshold_splits_blocks() {
        let base = at(8, 0, 0);
        let times: Vec<_> = [0, 100, 200, 900, 1000]
            .iter()
            .map(|s| base + Duration::seconds(*s))
            .collect();
        let blocks = find_blocks(&times, gap());
        assert_eq!(blocks.len(), 2);
        assert_eq!((blocks[0].start, blocks[0].end), (base, base + Duration::seconds(200)));
        assert_eq!(
            (blocks[1].start, blocks[1].end),
            (base + Duration::seconds(900), base + Duration::seconds(1000))
        );
        assert_eq!(blocks[0].events, 3);
    }

    #[test]
    fn gap_equal_to_threshold_keeps_block() {
        let base = at(8, 0, 0);
        let blocks = find_blocks(&[base, base + gap()], gap());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].duration(), gap());
    }

    #[test]
    fn single_event_block_has_zero_duration() {
        let activity = DayActivity::new(day(), None, vec![at(12, 0, 0)], None);
        let running = running_intervals(&activity, gap());
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].duration(), Duration::zero());

        let util = daily_utilization(&activity, gap());
        assert_eq!(util.running_hours, 0.0);
        assert_eq!(util.planned_down_hours, 24.0);
    }

    #[test]
    fn empty_day_is_entirely_down() {
        let activity = DayActivity::new(day(), None, Vec::new(), None);
        let util = daily_utilization(&activity, gap());
        assert_eq!(util.running_hours, 0.0);
        assert_eq!(util.planned_down_hours, 24.0);

        let intervals = classify_day(&activity, gap());
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].state, MachineState::Down);
        assert_eq!(intervals[0].hours(), 24.0);
    }

    #[test]
    fn head_and_tail_of_day_are_down() {
        let events = vec![at(8, 0, 0), at(8, 5, 0), at(10, 0, 0)];
        let activity = DayActivity::new(day(), None, events, None);
        let intervals = classify_day(&activity, gap());

        // the lone 10:00 event covers no time and leaves 08:05..midnight as one down interval
        let states: Vec<_> = intervals.iter().map(|i| i.state).collect();
        assert_eq!(states, vec![MachineState::Down, MachineState::Running, MachineState::Down]);
        assert_eq!(intervals[0].start, day_start(day()));
        assert_eq!(intervals[0].end, at(8, 0, 0));
        assert_eq!(intervals[2].start, at(8, 5, 0));
        assert_eq!(intervals.last().unwrap().end, day_end(day()));

        let total: Duration = intervals.iter().map(|i| i.duration()).sum();
        assert_eq!(total, Duration::days(1));
    }

    #[test]
    fn midnight_crossing_block_is_clipped_at_both_ends() {
        let prev_evening = Utc.with_ymd_and_hms(2022, 2, 22, 23, 55, 0).unwrap();
        let next_morning = Utc.with_ymd_and_hms(2022, 2, 24, 0, 4, 0).unwrap();
        let events = vec![at(0, 5, 0), at(23, 58, 0)];
        let activity = DayActivity::new(day(), Some(prev_evening), events, Some(next_morning));
        let running = running_intervals(&activity, gap());

        assert_eq!(running.len(), 2);
        assert_eq!(running[0].start, day_start(day()));
        assert_eq!(running[0].end, at(0, 5, 0));
        assert_eq!(running[1].start, at(23, 58, 0));
        assert_eq!(running[1].end, day_end(day()));
        assert!(running.iter().all(|i| i.date == day()));
    }

    #[test]
    fn carry_in_beyond_threshold_is_ignored() {
        let prev_evening = Utc.with_ymd_and_hms(2022, 2, 22, 23, 0, 0).unwrap();
        let activity = DayActivity::new(day(), Some(prev_evening), vec![at(0, 5, 0), at(0, 9, 0)], None);
        let running = running_intervals(&activity, gap());
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].start, at(0, 5, 0));
    }

    #[test]
    fn bridge_into_next_day_is_clipped_at_midnight() {
        let prev = Utc.with_ymd_and_hms(2022, 2, 22, 23, 58, 0).unwrap();
        let next = at(0, 2, 0);
        let activity = DayActivity {
            day: day(),
            carry_in: Some(prev),
            events: Vec::new(),
            carry_out: None,
        };
        assert!(running_intervals(&activity, gap()).is_empty());

        let activity = DayActivity::new(NaiveDate::from_ymd_opt(2022, 2, 22).unwrap(), None, vec![prev], Some(next));
        let running = running_intervals(&activity, gap());
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].end, day_start(day()));
    }

    #[test]
    fn split_by_day_covers_multi_day_span() {
        let start = Utc.with_ymd_and_hms(2022, 2, 22, 22, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 2, 24, 1, 0, 0).unwrap();
        let pieces = split_by_day(start, end, MachineState::Running);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].hours(), 2.0);
        assert_eq!(pieces[1].hours(), 24.0);
        assert_eq!(pieces[2].hours(), 1.0);

        let exact = split_by_day(start, day_start(day()), MachineState::Down);
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn running_plus_down_is_always_a_full_day() {
        let mut rng = SmallRng::seed_from_u64(0x5EED_0001);
        for _ in 0..200 {
            let count = rng.random_range(0..300);
            let events: Vec<_> = (0..count)
                .map(|_| day_start(day()) + Duration::seconds(rng.random_range(0..86_400)))
                .collect();
            let activity = DayActivity::new(day(), None, events, None);

            let util = daily_utilization(&activity, gap());
            assert!((util.running_hours + util.planned_down_hours - 24.0).abs() < 0.01);

            let intervals = classify_day(&activity, gap());
            let covered: Duration = intervals.iter().map(|i| i.duration()).sum();
            assert_eq!(covered, Duration::days(1));
            for pair in intervals.windows(2) {
                assert!(pair[0].end <= pair[1].start);
                assert!(!(pair[0].state == MachineState::Down && pair[1].state == MachineState::Down));
            }
        }
    }

    #[test]
    fn held_states_are_clipped_to_window() {
        let window = TimeWindow::new(at(0, 0, 0), at(12, 0, 0));
        let changes = vec![(at(2, 0, 0), 7), (at(5, 0, 0), 9), (at(13, 0, 0), 1)];
        let spans = hold_until_next(Some(3), &changes, &window);

        assert_eq!(spans.len(), 3);
        assert_eq!((spans[0].value, spans[0].end), (3, at(2, 0, 0)));
        assert_eq!((spans[1].value, spans[1].end), (7, at(5, 0, 0)));
        assert_eq!((spans[2].value, spans[2].end), (9, at(12, 0, 0)));

        let no_prior = hold_until_next(None, &changes, &window);
        assert_eq!(no_prior.first().map(|s| s.start), Some(at(2, 0, 0)));
    }
}
