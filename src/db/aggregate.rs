//! Writes to the aggregation database.
//!
//! Every load call runs in its own transaction and is chunked to stay below Postgres' bind
//! parameter limit.

use crate::db::models::{
    DataStatus, NewActivityDaily, NewAlertCount, NewAlertDetail, NewEnergyHourly, NewProgramData, NewSensorStat,
    NewUtilizationInterval,
};
use crate::engine::segment::Interval;
use crate::error::EtlError;
use crate::models::records::{
    AlertDailyCount, AlertDetail, DailyUtilization, EnergyHourly, ProgramUsage, SensorStat, Watermark,
};
use crate::schema;
use crate::store::{replaced_dates, AggregateStore, AlertLoad, ReplaceOutcome};
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const CHUNK_ROWS: usize = 1000;

pub struct PgAggregateStore {
    conn: PgConnection,
}

impl PgAggregateStore {
    pub fn connect(url: &str) -> Result<Self, EtlError> {
        let conn = PgConnection::establish(url)
            .map_err(|e| EtlError::Load(format!("aggregation DB connection failed: {}", e)))?;
        Ok(PgAggregateStore { conn })
    }

    pub fn apply_migrations(&mut self) -> Result<(), EtlError> {
        match self.conn.run_pending_migrations(MIGRATIONS) {
            Ok(applied) => {
                if applied.is_empty() {
                    info!("Aggregation schema is up to date; no migrations were applied");
                } else {
                    let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                    info!("Applied {} database migration(s): {}", applied.len(), names);
                }
                Ok(())
            }
            Err(e) => Err(EtlError::Load(format!("applying database migrations failed: {}", e))),
        }
    }
}

impl AggregateStore for PgAggregateStore {
    fn upsert_sensor_stats(&mut self, rows: &[SensorStat]) -> Result<usize, EtlError> {
        use schema::agg_sensor_stats::dsl as S;

        let now = Utc::now();
        let rows: Vec<NewSensorStat> = rows.iter().map(|r| NewSensorStat::from_stat(r, now)).collect();
        self.conn
            .transaction(|conn| {
                let mut written = 0;
                for chunk in rows.chunks(CHUNK_ROWS) {
                    written += diesel::insert_into(S::agg_sensor_stats)
                        .values(chunk)
                        .on_conflict((S::sensor_name, S::dt))
                        .do_update()
                        .set((
                            S::min_value.eq(excluded(S::min_value)),
                            S::avg_value.eq(excluded(S::avg_value)),
                            S::max_value.eq(excluded(S::max_value)),
                            S::std_dev.eq(excluded(S::std_dev)),
                            S::readings_count.eq(excluded(S::readings_count)),
                            S::last_updated_at.eq(excluded(S::last_updated_at)),
                        ))
                        .execute(conn)?;
                }
                Ok::<usize, diesel::result::Error>(written)
            })
            .map_err(|e| EtlError::Load(format!("upsert sensor stats failed: {}", e)))
    }

    fn upsert_daily_utilization(&mut self, rows: &[DailyUtilization]) -> Result<usize, EtlError> {
        use schema::agg_machine_activity_daily::dsl as A;

        let now = Utc::now();
        let rows: Vec<NewActivityDaily> = rows.iter().map(|r| NewActivityDaily::from_daily(r, now)).collect();
        self.conn
            .transaction(|conn| {
                let mut written = 0;
                for chunk in rows.chunks(CHUNK_ROWS) {
                    written += diesel::insert_into(A::agg_machine_activity_daily)
                        .values(chunk)
                        .on_conflict(A::dt)
                        .do_update()
                        .set((
                            A::state_running.eq(excluded(A::state_running)),
                            A::state_planned_down.eq(excluded(A::state_planned_down)),
                            A::state_unplanned_down.eq(excluded(A::state_unplanned_down)),
                            A::last_updated_at.eq(excluded(A::last_updated_at)),
                        ))
                        .execute(conn)?;
                }
                Ok::<usize, diesel::result::Error>(written)
            })
            .map_err(|e| EtlError::Load(format!("upsert daily utilization failed: {}", e)))
    }

    fn replace_utilization_intervals(&mut self, rows: &[Interval]) -> Result<ReplaceOutcome, EtlError> {
        use schema::machine_utilization::dsl as M;

        let Some(span) = replaced_dates(rows) else {
            return Ok(ReplaceOutcome::default());
        };
        let rows: Vec<NewUtilizationInterval> = rows.iter().map(NewUtilizationInterval::from).collect();
        self.conn
            .transaction(|conn| {
                let deleted = diesel::delete(M::machine_utilization.filter(M::dt.between(span.from, span.to)))
                    .execute(conn)?;
                let mut inserted = 0;
                for chunk in rows.chunks(CHUNK_ROWS) {
                    inserted += diesel::insert_into(M::machine_utilization).values(chunk).execute(conn)?;
                }
                Ok::<ReplaceOutcome, diesel::result::Error>(ReplaceOutcome { deleted, inserted })
            })
            .map_err(|e| EtlError::Load(format!("replace utilization intervals failed: {}", e)))
    }

    fn upsert_program_usage(&mut self, rows: &[ProgramUsage]) -> Result<usize, EtlError> {
        use schema::machine_program_data::dsl as P;

        let rows: Vec<NewProgramData> = rows.iter().map(NewProgramData::from).collect();
        self.conn
            .transaction(|conn| {
                let mut written = 0;
                for chunk in rows.chunks(CHUNK_ROWS) {
                    written += diesel::insert_into(P::machine_program_data)
                        .values(chunk)
                        .on_conflict((P::dt, P::program))
                        .do_update()
                        .set(P::duration_seconds.eq(excluded(P::duration_seconds)))
                        .execute(conn)?;
                }
                Ok::<usize, diesel::result::Error>(written)
            })
            .map_err(|e| EtlError::Load(format!("upsert program usage failed: {}", e)))
    }

    fn load_alerts(&mut self, counts: &[AlertDailyCount], details: &[AlertDetail]) -> Result<AlertLoad, EtlError> {
        use schema::alerts_daily_count::dsl as C;
        use schema::alerts_detail::dsl as D;

        let counts: Vec<NewAlertCount> = counts.iter().map(NewAlertCount::from).collect();
        let details: Vec<NewAlertDetail> = details.iter().map(NewAlertDetail::from).collect();
        self.conn
            .transaction(|conn| {
                let mut load = AlertLoad::default();
                for chunk in counts.chunks(CHUNK_ROWS) {
                    load.counted += diesel::insert_into(C::alerts_daily_count)
                        .values(chunk)
                        .on_conflict((C::day, C::alert_type))
                        .do_update()
                        .set(C::amount.eq(excluded(C::amount)))
                        .execute(conn)?;
                }
                for chunk in details.chunks(CHUNK_ROWS) {
                    load.appended += diesel::insert_into(D::alerts_detail).values(chunk).execute(conn)?;
                }
                Ok::<AlertLoad, diesel::result::Error>(load)
            })
            .map_err(|e| EtlError::Load(format!("load alerts failed: {}", e)))
    }

    fn upsert_energy_hourly(&mut self, rows: &[EnergyHourly]) -> Result<usize, EtlError> {
        use schema::energy_consumption_hourly::dsl as E;

        let rows: Vec<NewEnergyHourly> = rows.iter().map(NewEnergyHourly::from).collect();
        self.conn
            .transaction(|conn| {
                let mut written = 0;
                for chunk in rows.chunks(CHUNK_ROWS) {
                    written += diesel::insert_into(E::energy_consumption_hourly)
                        .values(chunk)
                        .on_conflict(E::hour_ts)
                        .do_update()
                        .set(E::energy_kwh.eq(excluded(E::energy_kwh)))
                        .execute(conn)?;
                }
                Ok::<usize, diesel::result::Error>(written)
            })
            .map_err(|e| EtlError::Load(format!("upsert hourly energy failed: {}", e)))
    }

    fn watermarks(&mut self) -> Result<Vec<Watermark>, EtlError> {
        use schema::v_data_status::dsl as V;

        let rows: Vec<DataStatus> = V::v_data_status
            .select(DataStatus::as_select())
            .order(V::table_name.asc())
            .load(&mut self.conn)
            .map_err(|e| EtlError::Load(format!("read data status failed: {}", e)))?;
        Ok(rows.into_iter().map(Watermark::from).collect())
    }
}
