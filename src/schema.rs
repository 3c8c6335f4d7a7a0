// Table blocks follow Diesel CLI output; `v_data_status` is a view and is maintained by hand.

diesel::table! {
    agg_machine_activity_daily (dt) {
        dt -> Date,
        state_planned_down -> Float8,
        state_running -> Float8,
        state_unplanned_down -> Float8,
        last_updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    agg_sensor_stats (sensor_name, dt) {
        sensor_name -> Text,
        dt -> Timestamptz,
        min_value -> Nullable<Float8>,
        avg_value -> Nullable<Float8>,
        max_value -> Nullable<Float8>,
        std_dev -> Nullable<Float8>,
        readings_count -> Nullable<Int4>,
        last_updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    alerts_daily_count (day, alert_type) {
        day -> Date,
        alert_type -> Text,
        amount -> Int8,
    }
}

diesel::table! {
    alerts_detail (id) {
        id -> Int8,
        dt -> Timestamptz,
        alert_type -> Text,
        alarm_code -> Nullable<Text>,
        alarm_description -> Nullable<Text>,
        raw_elem_json -> Nullable<Jsonb>,
    }
}

diesel::table! {
    energy_consumption_hourly (hour_ts) {
        hour_ts -> Timestamptz,
        energy_kwh -> Float8,
    }
}

diesel::table! {
    machine_program_data (id) {
        id -> Int4,
        dt -> Date,
        program -> Int4,
        duration_seconds -> Int8,
    }
}

diesel::table! {
    machine_utilization (id) {
        id -> Int4,
        machine_state -> Text,
        state_start_time -> Timestamptz,
        state_end_time -> Timestamptz,
        dt -> Nullable<Date>,
    }
}

diesel::table! {
    v_data_status (table_name) {
        table_name -> Text,
        first_date -> Nullable<Date>,
        last_date -> Nullable<Date>,
        total_records -> Int8,
        last_updated -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    agg_machine_activity_daily,
    agg_sensor_stats,
    alerts_daily_count,
    alerts_detail,
    energy_consumption_hourly,
    machine_program_data,
    machine_utilization,
);
