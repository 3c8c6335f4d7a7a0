//! Handwritten Diesel declarations for the production monitoring database.
//!
//! That database is owned by the monitoring system and is never migrated from here, so these
//! tables are not part of `migrations/`. `date` columns hold epoch milliseconds.

diesel::table! {
    variable (id) {
        id -> Integer,
        name -> Text,
        datatype -> Nullable<Text>,
    }
}

diesel::table! {
    variable_log_float (id_var, date) {
        id_var -> Integer,
        date -> BigInt,
        value -> Nullable<Double>,
    }
}

diesel::table! {
    variable_log_string (id_var, date) {
        id_var -> Integer,
        date -> BigInt,
        value -> Nullable<Text>,
    }
}

diesel::joinable!(variable_log_float -> variable (id_var));
diesel::joinable!(variable_log_string -> variable (id_var));

diesel::allow_tables_to_appear_in_same_query!(variable, variable_log_float, variable_log_string);
