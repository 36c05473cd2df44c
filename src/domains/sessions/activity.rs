use super::entity::SessionState;
use chrono::{DateTime, Utc};

/// State of a live handle from the host's shell-execution report. Orphaned
/// is never derived here; it belongs to pending records only.
pub fn classify_live(shell_busy: bool) -> SessionState {
    if shell_busy {
        SessionState::Active
    } else {
        SessionState::Inactive
    }
}

/// Human-readable age of a session relative to `now`.
pub fn describe(
    state: SessionState,
    last_activity_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    if state == SessionState::Orphaned {
        return "previous session".to_string();
    }
    let Some(last) = last_activity_at else {
        return String::new();
    };

    let elapsed = (now - last).num_seconds().max(0);
    if elapsed < 60 {
        "just now".to_string()
    } else if elapsed < 3600 {
        format!("{}m", elapsed / 60)
    } else {
        format!("{}h", elapsed / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn busy_shell_is_active() {
        assert_eq!(classify_live(true), SessionState::Active);
        assert_eq!(classify_live(false), SessionState::Inactive);
    }

    #[test]
    fn orphaned_records_get_fixed_text() {
        assert_eq!(
            describe(SessionState::Orphaned, None, now()),
            "previous session"
        );
        // Fixed text wins even when an activity timestamp exists.
        assert_eq!(
            describe(SessionState::Orphaned, Some(now()), now()),
            "previous session"
        );
    }

    #[test]
    fn missing_activity_describes_as_empty() {
        assert_eq!(describe(SessionState::Inactive, None, now()), "");
    }

    #[test]
    fn age_buckets() {
        let cases = [
            (Duration::seconds(5), "just now"),
            (Duration::seconds(59), "just now"),
            (Duration::seconds(60), "1m"),
            (Duration::minutes(59), "59m"),
            (Duration::minutes(60), "1h"),
            (Duration::hours(26), "26h"),
        ];
        for (ago, expected) in cases {
            assert_eq!(
                describe(SessionState::Active, Some(now() - ago), now()),
                expected,
                "offset {ago:?}"
            );
        }
    }

    #[test]
    fn clock_skew_counts_as_just_now() {
        let future = now() + Duration::seconds(30);
        assert_eq!(describe(SessionState::Active, Some(future), now()), "just now");
    }
}
