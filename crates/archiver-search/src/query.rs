//! Request bodies sent to the index.

use serde_json::{json, Value};

use archiver_types::TimeWindow;

/// Field every archived document is ordered and filtered by.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Inclusive range predicate covering `window`.
pub fn window_range(window: &TimeWindow) -> Value {
    json!({
        "range": {
            TIMESTAMP_FIELD: {
                "gte": window.start_rfc3339(),
                "lte": window.end_rfc3339(),
            }
        }
    })
}

pub fn count_body(window: &TimeWindow) -> Value {
    json!({ "query": window_range(window) })
}

pub fn search_body(window: &TimeWindow, size: u64) -> Value {
    json!({
        "query": window_range(window),
        "sort": [
            { TIMESTAMP_FIELD: { "order": "asc" } }
        ],
        "size": size,
    })
}

/// Relative cutoff in date-math, e.g. `now-30d/d`.
pub fn retention_cutoff(retention_days: u32) -> String {
    format!("now-{}d/d", retention_days)
}

pub fn retention_body(retention_days: u32) -> Value {
    json!({
        "query": {
            "range": {
                TIMESTAMP_FIELD: {
                    "lte": retention_cutoff(retention_days),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn window() -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2024, 5, 10, 4, 0, 0).unwrap();
        TimeWindow::new(3, start, start + Duration::hours(2) - Duration::milliseconds(1))
    }

    #[test]
    fn test_count_body() {
        let body = count_body(&window());
        assert_eq!(
            body,
            json!({
                "query": {
                    "range": {
                        "@timestamp": {
                            "gte": "2024-05-10T04:00:00.000Z",
                            "lte": "2024-05-10T05:59:59.999Z"
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_search_body_sorts_ascending_with_size() {
        let body = search_body(&window(), 42);
        assert_eq!(body["size"], 42);
        assert_eq!(body["sort"][0]["@timestamp"]["order"], "asc");
        assert_eq!(body["query"], count_body(&window())["query"]);
    }

    #[test]
    fn test_retention_body_floors_to_day() {
        let body = retention_body(30);
        assert_eq!(body["query"]["range"]["@timestamp"]["lte"], "now-30d/d");
        assert!(body["query"]["range"]["@timestamp"].get("gte").is_none());
    }
}
