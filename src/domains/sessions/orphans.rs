use super::entity::DurableSessionRecord;
use log::info;

/// A pending record is evicted once it has survived this many reconciliation
/// cycles without a matching handle.
pub const ORPHAN_EVICTION_REBOOTS: u32 = 2;

/// Ages a loaded snapshot: every record gets `last_seen_at` backfilled and
/// its reboot counter incremented, then records at the eviction bound are
/// dropped. Eviction is normal lifecycle, not a failure.
pub fn age_snapshot(records: Vec<DurableSessionRecord>, now_ms: i64) -> Vec<DurableSessionRecord> {
    let mut survivors = Vec::with_capacity(records.len());
    for mut record in records {
        if record.last_seen_at == 0 {
            record.last_seen_at = now_ms;
        }
        record.reboot_count += 1;
        if record.reboot_count >= ORPHAN_EVICTION_REBOOTS {
            info!(
                "Evicting stale session record {} ('{}') after {} reboots",
                record.id, record.display_name, record.reboot_count
            );
            continue;
        }
        survivors.push(record);
    }
    survivors
}

/// Owns the durable records that have not (yet) been matched to a live
/// handle. A record leaves the set by being claimed, relaunched, dismissed,
/// or evicted — never by timeout.
#[derive(Default)]
pub struct OrphanTracker {
    pending: Vec<DurableSessionRecord>,
}

impl OrphanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, records: Vec<DurableSessionRecord>) {
        self.pending = records;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.pending.iter().any(|r| r.id == record_id)
    }

    /// Snapshot sorted by creation time, the order every matching pass and
    /// relaunch-all walk uses.
    pub fn records_by_age(&self) -> Vec<DurableSessionRecord> {
        let mut records = self.pending.clone();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    pub fn take(&mut self, record_id: &str) -> Option<DurableSessionRecord> {
        let at = self.pending.iter().position(|r| r.id == record_id)?;
        Some(self.pending.remove(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, reboot_count: u32, last_seen_at: i64) -> DurableSessionRecord {
        DurableSessionRecord {
            id: id.to_string(),
            label_key: format!("alpha:{id}"),
            display_name: format!("🤖 alpha #{id}"),
            original_name: None,
            agent_id: "alpha".to_string(),
            agent_name: "alpha".to_string(),
            agent_icon: "🤖".to_string(),
            index: 1,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            terminal_name: "🤖 alpha #1".to_string(),
            last_seen_at,
            last_activity_at: None,
            reboot_count,
            agent_session_id: None,
            launch_command: None,
            working_directory: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn aging_increments_reboot_count() {
        let survivors = age_snapshot(vec![record("a", 0, 100)], 999);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].reboot_count, 1);
        assert_eq!(survivors[0].last_seen_at, 100);
    }

    #[test]
    fn aging_backfills_missing_last_seen() {
        let survivors = age_snapshot(vec![record("a", 0, 0)], 999);
        assert_eq!(survivors[0].last_seen_at, 999);
    }

    #[test]
    fn record_survives_exactly_bound_minus_one_cycles() {
        let mut records = vec![record("a", 0, 100)];
        records = age_snapshot(records, 999);
        assert_eq!(records.len(), 1, "first failed cycle keeps the record");
        records = age_snapshot(records, 999);
        assert!(records.is_empty(), "second failed cycle evicts it");
    }

    #[test]
    fn take_removes_exactly_one_record() {
        let mut tracker = OrphanTracker::new();
        tracker.replace(vec![record("a", 0, 1), record("b", 0, 1)]);

        assert!(tracker.take("a").is_some());
        assert!(tracker.take("a").is_none());
        assert!(tracker.contains("b"));
    }

    #[test]
    fn records_by_age_sorts_by_creation_then_id() {
        let mut early = record("z-early", 0, 1);
        early.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let late = record("a-late", 0, 1);

        let mut tracker = OrphanTracker::new();
        tracker.replace(vec![late, early]);

        let ids: Vec<String> = tracker.records_by_age().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["z-early".to_string(), "a-late".to_string()]);
    }
}
