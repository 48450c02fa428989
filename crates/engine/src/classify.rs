//! Source classification for fragment lists that come without a plan.
//!
//! Classification runs an ordered list of tiers; the first tier that names
//! at least one fragment decides.

use planscope_common::{FragmentId, PlanFragment};
use std::collections::BTreeSet;
use tracing::debug;

/// A set-level classification rule.
pub type SourceTier = fn(&[PlanFragment]) -> BTreeSet<FragmentId>;

/// Tiers in priority order.
pub const SOURCE_TIERS: &[(&str, SourceTier)] =
    &[("signalled", signalled_sources), ("highest_fragment_id", highest_fragment_id)];

/// Partitioning marks the fragment as reading raw data.
pub fn partitioned_as_source(fragment: &PlanFragment) -> bool {
    fragment
        .partitioning_type
        .as_deref()
        .is_some_and(|p| p == "SOURCE" || p.contains("SCAN"))
}

/// Some operator scans a table. An operator type mentioning `Scan` or
/// `Source` counts, except exchange reads (`RemoteSource`, `RemoteMerge`),
/// which read other fragments and never mark a fragment as a source.
pub fn scans_table(fragment: &PlanFragment) -> bool {
    fragment.operators.iter().filter_map(|op| op.operator_type()).any(|ty| {
        !ty.starts_with("Remote")
            && (ty.contains("TableScan") || ty.contains("Scan") || ty.contains("Source"))
    })
}

pub fn signalled_sources(fragments: &[PlanFragment]) -> BTreeSet<FragmentId> {
    fragments
        .iter()
        .filter(|f| partitioned_as_source(f) || scans_table(f))
        .map(|f| f.fragment_id)
        .collect()
}

/// Higher fragment IDs are scheduled closer to the data.
pub fn highest_fragment_id(fragments: &[PlanFragment]) -> BTreeSet<FragmentId> {
    fragments.iter().map(|f| f.fragment_id).max().into_iter().collect()
}

pub fn classify_sources(fragments: &[PlanFragment]) -> BTreeSet<FragmentId> {
    for (name, tier) in SOURCE_TIERS {
        let sources = tier(fragments);
        if !sources.is_empty() {
            debug!(tier = *name, count = sources.len(), "Classified source fragments");
            return sources;
        }
    }
    BTreeSet::new()
}
