//! Thin wrapper around wall-clock time so transaction-time assignment has a
//! single seam if it ever needs to be swapped for a test double.

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
