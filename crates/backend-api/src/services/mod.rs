pub mod analytics;
pub mod attendance;
pub mod auth;
pub mod bacentas;
pub mod chat;
pub mod churches;
pub mod deletion_requests;
pub mod error;
pub mod guests;
pub mod head_counts;
pub mod invites;
pub mod members;
pub mod new_believers;
pub mod notifications;
pub mod tenancy;
pub mod users;

#[cfg(test)]
pub mod test_utils;

pub use error::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time in the fixed-width form every service writes, so stored
/// timestamps compare correctly as text.
pub fn now() -> String {
    timestamp(Utc::now())
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_utc() {
        let at = Utc.with_ymd_and_hms(2024, 1, 7, 9, 30, 0).unwrap();
        assert_eq!(timestamp(at), "2024-01-07T09:30:00.000000Z");
        assert_eq!(now().len(), timestamp(at).len());
    }
}
