//! Execution order of the entries registered under one hook key.
//!
//! Entries are sorted topologically: an entry declaring `before: X` gets an
//! edge to every entry owned by plugin `X`. Among entries whose predecessors
//! have all been placed, the lowest `stage` goes first and registration order
//! breaks ties. Constraints that cannot be satisfied are reported instead of
//! looping.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{HooklineError, Result};

use super::types::HookEntry;

/// Return indices into `entries` in execution order.
pub fn order_entries(key: &str, entries: &[&HookEntry]) -> Result<Vec<usize>> {
    let n = entries.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for (i, entry) in entries.iter().enumerate() {
        let Some(target) = entry.before.as_deref() else {
            continue;
        };
        // A constraint against one's own plugin is meaningless
        if entry.plugin_id.as_deref() == Some(target) {
            continue;
        }
        for (j, other) in entries.iter().enumerate() {
            if i != j && other.plugin_id.as_deref() == Some(target) {
                successors[i].push(j);
                indegree[j] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(i32, usize)>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse((entries[i].stage, i)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(i);
        for &j in &successors[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse((entries[j].stage, j)));
            }
        }
    }

    if order.len() < n {
        let mut stuck: Vec<&str> = (0..n)
            .filter(|i| indegree[*i] > 0)
            .map(|i| entries[i].plugin_id.as_deref().unwrap_or("<host>"))
            .collect();
        stuck.sort_unstable();
        stuck.dedup();
        return Err(HooklineError::HookOrderCycle {
            key: key.to_string(),
            plugins: stuck.join(", "),
        });
    }

    Ok(order)
}
