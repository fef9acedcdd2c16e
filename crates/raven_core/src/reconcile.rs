//! crates/raven_core/src/reconcile.rs
//!
//! Merges the locally cached poem list with the one stored in the cloud.
//!
//! Conflict policy is last-writer-wins by source: when both sides hold the same
//! id, the cloud copy replaces the local one wholesale. There is no version or
//! modification-time comparison, which is only sound while poems are append-only.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use crate::domain::Poem;

/// Builds one view from both lists: local poems go in first, cloud poems
/// overwrite on id collision, and the result is ordered newest first.
pub fn merge_poems(local: &[Poem], cloud: &[Poem]) -> Vec<Poem> {
    let mut by_id: HashMap<Uuid, Poem> = HashMap::with_capacity(local.len() + cloud.len());
    for poem in local.iter().chain(cloud) {
        by_id.insert(poem.id, poem.clone());
    }

    let mut merged: Vec<Poem> = by_id.into_values().collect();
    // Ties on created_at fall back to id so the output does not depend on hash order.
    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    merged
}

/// Poems the cloud has never seen, in their local order.
pub fn local_only(local: &[Poem], cloud: &[Poem]) -> Vec<Poem> {
    let known: HashSet<Uuid> = cloud.iter().map(|p| p.id).collect();
    local
        .iter()
        .filter(|p| !known.contains(&p.id))
        .cloned()
        .collect()
}
