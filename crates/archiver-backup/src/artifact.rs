//! Deterministic artifact names.
//!
//! Names carry the day as `MM-DD-YY`, e.g. `03-01-24-logs-2.json` for the
//! second window of `logs` on 2024-03-01.

use chrono::NaiveDate;

pub fn day_label(day: NaiveDate) -> String {
    day.format("%m-%d-%y").to_string()
}

pub fn window_file_name(day: NaiveDate, index: &str, sequence: usize) -> String {
    format!("{}-{}-{}.json", day_label(day), index, sequence)
}

pub fn day_file_name(day: NaiveDate, index: &str) -> String {
    format!("{}-{}.json", day_label(day), index)
}

pub fn compressed_file_name(day_file: &str) -> String {
    format!("{}.gz", day_file)
}
