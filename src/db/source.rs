//! Read-only queries against the production monitoring database.

use crate::db::models::{FloatLog, StringLog};
use crate::db::schema as source;
use crate::error::EtlError;
use crate::models::records::RawEvent;
use crate::store::{SourceStore, SpanScope, ValueBounds};
use crate::utils::{from_epoch_millis, DateSpan, TimeWindow};
use chrono::{DateTime, Duration, Utc};
use diesel::dsl::{max, min};
use diesel::prelude::*;
use diesel::PgConnection;

pub struct PgSourceStore {
    conn: PgConnection,
}

fn query_failed(what: &str, e: diesel::result::Error) -> EtlError {
    EtlError::SourceUnavailable(format!("{} failed: {}", what, e))
}

fn to_time(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(from_epoch_millis)
}

/// Widen `(first, last)` with another `(min, max)` pair of epoch millis.
fn merge_extent(acc: (Option<i64>, Option<i64>), other: (Option<i64>, Option<i64>)) -> (Option<i64>, Option<i64>) {
    let lo = match (acc.0, other.0) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    let hi = match (acc.1, other.1) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    (lo, hi)
}

fn extent_to_span(extent: (Option<i64>, Option<i64>)) -> Option<DateSpan> {
    let first = to_time(extent.0)?.date_naive();
    let last = to_time(extent.1)?.date_naive();
    Some(DateSpan::new(first, last))
}

impl PgSourceStore {
    pub fn connect(url: &str) -> Result<Self, EtlError> {
        let conn = PgConnection::establish(url)
            .map_err(|e| EtlError::SourceUnavailable(format!("production DB connection failed: {}", e)))?;
        Ok(PgSourceStore { conn })
    }

    fn float_extent(&mut self, ids: &[i32], bounds: Option<ValueBounds>) -> Result<(Option<i64>, Option<i64>), EtlError> {
        use source::variable_log_float::dsl as F;

        let mut query = F::variable_log_float
            .select((min(F::date), max(F::date)))
            .filter(F::id_var.eq_any(ids.to_vec()))
            .into_boxed();
        if let Some(b) = bounds {
            query = query.filter(F::value.ge(b.min)).filter(F::value.lt(b.max));
        }
        query
            .first::<(Option<i64>, Option<i64>)>(&mut self.conn)
            .map_err(|e| query_failed("float date range", e))
    }
}

impl SourceStore for PgSourceStore {
    fn variable_id(&mut self, name: &str) -> Result<Option<i32>, EtlError> {
        use source::variable::dsl as V;

        V::variable
            .filter(V::name.eq(name))
            .select(V::id)
            .first::<i32>(&mut self.conn)
            .optional()
            .map_err(|e| query_failed(&format!("variable lookup ({})", name), e))
    }

    fn float_events(&mut self, ids: &[i32], window: &TimeWindow) -> Result<Vec<RawEvent>, EtlError> {
        use source::variable_log_float::dsl as F;

        if ids.is_empty() || window.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<FloatLog> = F::variable_log_float
            .filter(F::id_var.eq_any(ids.to_vec()))
            .filter(F::date.ge(window.start_millis()))
            .filter(F::date.lt(window.end_millis()))
            .order((F::date.asc(), F::id_var.asc()))
            .select(FloatLog::as_select())
            .load(&mut self.conn)
            .map_err(|e| query_failed("float events", e))?;
        Ok(rows.into_iter().filter_map(FloatLog::into_event).collect())
    }

    fn last_float_before(
        &mut self,
        id: i32,
        before: DateTime<Utc>,
        bounds: Option<ValueBounds>,
    ) -> Result<Option<RawEvent>, EtlError> {
        use source::variable_log_float::dsl as F;

        let mut query = F::variable_log_float
            .filter(F::id_var.eq(id))
            .filter(F::date.lt(before.timestamp_millis()))
            .into_boxed();
        if let Some(b) = bounds {
            query = query.filter(F::value.ge(b.min)).filter(F::value.lt(b.max));
        }
        let row: Option<FloatLog> = query
            .order(F::date.desc())
            .select(FloatLog::as_select())
            .first(&mut self.conn)
            .optional()
            .map_err(|e| query_failed("previous float event", e))?;
        Ok(row.and_then(FloatLog::into_event))
    }

    fn string_events(&mut self, id: i32, window: &TimeWindow) -> Result<Vec<RawEvent>, EtlError> {
        use source::variable_log_string::dsl as S;

        if window.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<StringLog> = S::variable_log_string
            .filter(S::id_var.eq(id))
            .filter(S::date.ge(window.start_millis()))
            .filter(S::date.lt(window.end_millis()))
            .order(S::date.asc())
            .select(StringLog::as_select())
            .load(&mut self.conn)
            .map_err(|e| query_failed("string events", e))?;
        Ok(rows.into_iter().filter_map(StringLog::into_event).collect())
    }

    fn activity_times(&mut self, window: &TimeWindow) -> Result<Vec<DateTime<Utc>>, EtlError> {
        use source::variable_log_float::dsl as F;
        use source::variable_log_string::dsl as S;

        if window.is_empty() {
            return Ok(Vec::new());
        }
        let mut millis: Vec<i64> = F::variable_log_float
            .filter(F::date.ge(window.start_millis()))
            .filter(F::date.lt(window.end_millis()))
            .select(F::date)
            .load(&mut self.conn)
            .map_err(|e| query_failed("float activity", e))?;
        let strings: Vec<i64> = S::variable_log_string
            .filter(S::date.ge(window.start_millis()))
            .filter(S::date.lt(window.end_millis()))
            .select(S::date)
            .load(&mut self.conn)
            .map_err(|e| query_failed("string activity", e))?;
        millis.extend(strings);
        millis.sort_unstable();
        Ok(millis.into_iter().filter_map(from_epoch_millis).collect())
    }

    fn activity_before(&mut self, before: DateTime<Utc>, within: Duration) -> Result<Option<DateTime<Utc>>, EtlError> {
        use source::variable_log_float::dsl as F;
        use source::variable_log_string::dsl as S;

        let ms = before.timestamp_millis();
        let lo = (before - within).timestamp_millis();
        let float_last: Option<i64> = F::variable_log_float
            .filter(F::date.ge(lo))
            .filter(F::date.lt(ms))
            .select(max(F::date))
            .first(&mut self.conn)
            .map_err(|e| query_failed("float activity before", e))?;
        let string_last: Option<i64> = S::variable_log_string
            .filter(S::date.ge(lo))
            .filter(S::date.lt(ms))
            .select(max(S::date))
            .first(&mut self.conn)
            .map_err(|e| query_failed("string activity before", e))?;
        Ok(to_time(float_last.max(string_last)))
    }

    fn activity_from(&mut self, from: DateTime<Utc>, within: Duration) -> Result<Option<DateTime<Utc>>, EtlError> {
        use source::variable_log_float::dsl as F;
        use source::variable_log_string::dsl as S;

        let ms = from.timestamp_millis();
        let hi = (from + within).timestamp_millis();
        let float_first: Option<i64> = F::variable_log_float
            .filter(F::date.ge(ms))
            .filter(F::date.le(hi))
            .select(min(F::date))
            .first(&mut self.conn)
            .map_err(|e| query_failed("float activity after", e))?;
        let string_first: Option<i64> = S::variable_log_string
            .filter(S::date.ge(ms))
            .filter(S::date.le(hi))
            .select(min(S::date))
            .first(&mut self.conn)
            .map_err(|e| query_failed("string activity after", e))?;
        let first = match (float_first, string_first) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Ok(to_time(first))
    }

    fn date_span(&mut self, scope: &SpanScope) -> Result<Option<DateSpan>, EtlError> {
        use source::variable_log_float::dsl as F;
        use source::variable_log_string::dsl as S;

        let extent = match scope {
            SpanScope::AllActivity => {
                let floats: (Option<i64>, Option<i64>) = F::variable_log_float
                    .select((min(F::date), max(F::date)))
                    .first(&mut self.conn)
                    .map_err(|e| query_failed("float date range", e))?;
                let strings: (Option<i64>, Option<i64>) = S::variable_log_string
                    .select((min(S::date), max(S::date)))
                    .first(&mut self.conn)
                    .map_err(|e| query_failed("string date range", e))?;
                merge_extent(floats, strings)
            }
            SpanScope::Float { ids, bounds } => self.float_extent(ids, *bounds)?,
            SpanScope::Strings { id } => S::variable_log_string
                .filter(S::id_var.eq(*id))
                .filter(S::value.is_not_null())
                .filter(S::value.ne("[]"))
                .select((min(S::date), max(S::date)))
                .first(&mut self.conn)
                .map_err(|e| query_failed("string date range", e))?,
        };
        Ok(extent_to_span(extent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn extents_merge_across_tables() {
        assert_eq!(merge_extent((Some(5), Some(9)), (Some(3), Some(7))), (Some(3), Some(9)));
        assert_eq!(merge_extent((None, None), (Some(3), Some(7))), (Some(3), Some(7)));
        assert_eq!(merge_extent((Some(5), Some(9)), (None, None)), (Some(5), Some(9)));
    }

    #[test]
    fn extent_becomes_utc_day_span() {
        let first = Utc.with_ymd_and_hms(2021, 9, 14, 23, 59, 59).unwrap().timestamp_millis();
        let last = Utc.with_ymd_and_hms(2021, 9, 30, 0, 0, 0).unwrap().timestamp_millis();
        let span = extent_to_span((Some(first), Some(last))).unwrap();
        assert_eq!(span.from, NaiveDate::from_ymd_opt(2021, 9, 14).unwrap());
        assert_eq!(span.to, NaiveDate::from_ymd_opt(2021, 9, 30).unwrap());
        assert_eq!(extent_to_span((None, None)), None);
    }
}
