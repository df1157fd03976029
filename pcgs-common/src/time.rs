//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 form used for audit timestamps stored in entry metadata
pub fn audit_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_is_after_2000() {
        assert!(now().timestamp() > 946_684_800);
    }

    #[test]
    fn test_audit_stamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(audit_stamp(at), "2024-03-09T14:05:00.000Z");
    }

    #[test]
    fn test_audit_stamp_parses_back() {
        let at = now();
        let parsed = DateTime::parse_from_rfc3339(&audit_stamp(at)).unwrap();
        assert_eq!(parsed.timestamp_millis(), at.timestamp_millis());
    }
}
