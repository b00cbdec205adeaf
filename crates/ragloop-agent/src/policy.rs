use std::collections::HashMap;

use ragloop_core::config::RelevancePolicy;
use ragloop_core::types::DocumentId;

/// Fold per-document verdicts into one decision. No verdicts means nothing
/// relevant, whatever the policy.
pub fn has_relevant(policy: RelevancePolicy, verdicts: &HashMap<DocumentId, bool>) -> bool {
    if verdicts.is_empty() {
        return false;
    }
    let relevant = verdicts.values().filter(|v| **v).count();
    match policy {
        RelevancePolicy::Any => relevant > 0,
        RelevancePolicy::Majority => relevant * 2 > verdicts.len(),
        RelevancePolicy::All => relevant == verdicts.len(),
    }
}
