use super::entity::DurableSessionRecord;
use crate::domains::terminal::{HandleDescriptor, HandleId};
use log::debug;
use std::collections::HashSet;

/// The successive matching passes, strongest signal first. Each pass only
/// sees handles left unclaimed by earlier passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// Handle name equals the name last observed before persistence.
    TerminalName,
    /// Handle name equals the record's name at creation time.
    OriginalName,
    /// Handle name equals the record's current display name.
    DisplayName,
    /// A record name contains the handle name. Best-effort only: hosts that
    /// decorate names can defeat exact comparison, and two records whose
    /// names contain each other are tie-broken by creation order, not by any
    /// real identity proof.
    NameFragment,
}

const PASSES: [MatchPass; 4] = [
    MatchPass::TerminalName,
    MatchPass::OriginalName,
    MatchPass::DisplayName,
    MatchPass::NameFragment,
];

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub record_id: String,
    pub handle: HandleId,
    pub pass: MatchPass,
}

fn pass_matches(pass: MatchPass, record: &DurableSessionRecord, handle_name: &str) -> bool {
    match pass {
        MatchPass::TerminalName => record.terminal_name == handle_name,
        MatchPass::OriginalName => record.original_name.as_deref() == Some(handle_name),
        MatchPass::DisplayName => record.display_name == handle_name,
        MatchPass::NameFragment => {
            if handle_name.is_empty() {
                return false;
            }
            record
                .original_name
                .as_deref()
                .map(|original| original.contains(handle_name))
                .unwrap_or(false)
                || record.terminal_name.contains(handle_name)
        }
    }
}

/// Pairs pending records with unclaimed live handles.
///
/// Records are processed in ascending creation-time order within each pass,
/// so when several records could claim the same handle the oldest wins the
/// earliest-appearing one. Every handle is claimed at most once across all
/// passes.
pub fn pair_records(
    records: &[DurableSessionRecord],
    handles: &[HandleDescriptor],
) -> Vec<MatchOutcome> {
    let mut ordered: Vec<&DurableSessionRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut claimed_handles: HashSet<&HandleId> = HashSet::new();
    let mut matched_records: HashSet<&str> = HashSet::new();
    let mut outcomes = Vec::new();

    for pass in PASSES {
        for record in &ordered {
            if matched_records.contains(record.id.as_str()) {
                continue;
            }
            let hit = handles.iter().find(|handle| {
                !claimed_handles.contains(&handle.id) && pass_matches(pass, record, &handle.name)
            });
            if let Some(handle) = hit {
                debug!(
                    "Reconciliation: record {} claimed handle {} via {:?}",
                    record.id, handle.id, pass
                );
                claimed_handles.insert(&handle.id);
                matched_records.insert(record.id.as_str());
                outcomes.push(MatchOutcome {
                    record_id: record.id.clone(),
                    handle: handle.id.clone(),
                    pass,
                });
            }
        }
    }

    outcomes
}

/// Single-record variant used by relaunch to prefer reconnection over
/// spawning a fresh terminal.
pub fn match_single(
    record: &DurableSessionRecord,
    handles: &[HandleDescriptor],
) -> Option<HandleId> {
    for pass in PASSES {
        if let Some(handle) = handles
            .iter()
            .find(|handle| pass_matches(pass, record, &handle.name))
        {
            return Some(handle.id.clone());
        }
    }
    None
}
