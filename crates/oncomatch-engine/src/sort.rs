//! Deterministic clinical-priority ordering of trial matches.
//!
//! Every match gets a five-field key: evidence tier bucket, match-type
//! specificity, cancer-type specificity, coordinating center, and
//! protocol recency. Lower sorts first. The final `sort_order` is the
//! per-sample rank of the key.

use std::collections::HashMap;

use crate::normalize;
use oncomatch_common::TrialMatch;

/// Tier bucket, checked in priority order. Structural-variant matches
/// outrank everything; untiered evidence (including clinical-only
/// matches) falls to the bottom bucket.
fn tier_bucket(m: &TrialMatch) -> i64 {
    let mmr_deficient = m
        .mmr_status
        .as_deref()
        .is_some_and(|s| s == normalize::MMR_DEFICIENT || s == "MMR-Deficient");
    if m.variant_category.as_deref() == Some(normalize::SV) {
        -1
    } else if mmr_deficient {
        0
    } else if m.tier == Some(1) {
        1
    } else if m.tier == Some(2) {
        2
    } else if m.variant_category.as_deref() == Some(normalize::CNV) {
        3
    } else if m.tier == Some(3) {
        4
    } else if m.tier == Some(4) {
        5
    } else if m.wildtype == Some(true) {
        6
    } else {
        7
    }
}

fn match_type_rank(m: &TrialMatch) -> i64 {
    match m.match_type.as_deref() {
        Some("variant") => 0,
        Some("gene") => 1,
        _ => 2,
    }
}

fn cancer_type_rank(m: &TrialMatch) -> i64 {
    match m.cancer_type_match.as_deref() {
        Some("specific") => 0,
        _ => 1,
    }
}

fn center_rank(m: &TrialMatch) -> i64 {
    match m.coordinating_center.as_deref() {
        Some("Dana-Farber Cancer Institute") => 0,
        _ => 1,
    }
}

/// Record `value` at `priority`, keeping the minimum when several matches
/// share a (sample, protocol) key.
fn add_sort_value(slot: &mut Vec<i64>, priority: usize, value: i64) {
    if slot.len() > priority {
        slot[priority] = slot[priority].min(value);
    } else {
        slot.push(value);
    }
}

/// Assign `sort_order` to every match.
pub fn add_sort_order(matches: &mut [TrialMatch]) {
    if matches.is_empty() {
        return;
    }

    type Key = (String, String);
    let key_of = |m: &TrialMatch| -> Key {
        (
            m.sample_id.clone(),
            m.protocol_no.clone().unwrap_or_default(),
        )
    };

    let mut order: HashMap<Key, Vec<i64>> = HashMap::new();
    for m in matches.iter() {
        let slot = order.entry(key_of(m)).or_default();
        add_sort_value(slot, 0, tier_bucket(m));
        add_sort_value(slot, 1, match_type_rank(m));
        add_sort_value(slot, 2, cancer_type_rank(m));
        add_sort_value(slot, 3, center_rank(m));
    }

    // Protocol recency: dense rank of descending protocol numbers within
    // each (sample, tier-bucket) group.
    let mut groups: HashMap<(String, i64), Vec<String>> = HashMap::new();
    for ((sample_id, protocol_no), slot) in &order {
        let protocols = groups
            .entry((sample_id.clone(), slot[0]))
            .or_default();
        if !protocols.contains(protocol_no) {
            protocols.push(protocol_no.clone());
        }
    }
    let mut recency: HashMap<(String, String), i64> = HashMap::new();
    for ((sample_id, _), mut protocols) in groups {
        protocols.sort_by(|a, b| b.cmp(a));
        for (rank, protocol_no) in protocols.into_iter().enumerate() {
            recency.insert((sample_id.clone(), protocol_no), rank as i64);
        }
    }
    for (key, slot) in order.iter_mut() {
        let rank = recency.get(key).copied().unwrap_or(0);
        add_sort_value(slot, 4, rank);
    }

    // Final per-sample rank over the five-field keys.
    let mut per_sample: HashMap<String, Vec<(Key, Vec<i64>)>> = HashMap::new();
    for (key, slot) in order {
        per_sample
            .entry(key.0.clone())
            .or_default()
            .push((key, slot));
    }
    let mut final_rank: HashMap<Key, i64> = HashMap::new();
    for (_, mut entries) in per_sample {
        // ties resolved toward higher protocol numbers, deterministically
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0 .1.cmp(&a.0 .1)));
        for (rank, (key, _)) in entries.into_iter().enumerate() {
            final_rank.insert(key, rank as i64);
        }
    }

    for m in matches.iter_mut() {
        m.sort_order = final_rank.get(&key_of(m)).copied();
    }
}
