// Key-level comparison of two containers.

use std::collections::{BTreeMap, HashSet};

use super::strategy::Source;
use crate::dbpf::{Container, ResourceKey, type_name};

/// Partition of the union of two containers' key sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonSummary {
    pub only_a: HashSet<ResourceKey>,
    pub only_b: HashSet<ResourceKey>,
    /// Present in both with identical bytes.
    pub common_same: HashSet<ResourceKey>,
    /// Present in both with different bytes.
    pub common_different: HashSet<ResourceKey>,
}

/// Per-type counts for each category of a `ComparisonSummary`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeBreakdown {
    pub only_a: BTreeMap<String, usize>,
    pub only_b: BTreeMap<String, usize>,
    pub common_same: BTreeMap<String, usize>,
    pub common_different: BTreeMap<String, usize>,
}

fn count_types(keys: &HashSet<ResourceKey>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(type_name(key.type_id)).or_insert(0) += 1;
    }
    counts
}

impl ComparisonSummary {
    /// Size of the key union.
    pub fn total(&self) -> usize {
        self.only_a.len() + self.only_b.len() + self.common_same.len() + self.common_different.len()
    }

    pub fn is_identical(&self) -> bool {
        self.only_a.is_empty() && self.only_b.is_empty() && self.common_different.is_empty()
    }

    pub fn by_type(&self) -> TypeBreakdown {
        TypeBreakdown {
            only_a: count_types(&self.only_a),
            only_b: count_types(&self.only_b),
            common_same: count_types(&self.common_same),
            common_different: count_types(&self.common_different),
        }
    }
}

/// Compare two containers by key and payload bytes.
pub fn compare(a: &Container, b: &Container) -> ComparisonSummary {
    let mut summary = ComparisonSummary::default();
    for ra in a.resources() {
        match b.get(&ra.key) {
            None => {
                summary.only_a.insert(ra.key);
            }
            Some(rb) if rb.data() == ra.data() => {
                summary.common_same.insert(ra.key);
            }
            Some(_) => {
                summary.common_different.insert(ra.key);
            }
        }
    }
    summary
        .only_b
        .extend(b.keys().filter(|k| !a.contains_key(k)).copied());

    log::debug!(
        "compare: only_a={} only_b={} same={} different={}",
        summary.only_a.len(),
        summary.only_b.len(),
        summary.common_same.len(),
        summary.common_different.len()
    );
    summary
}

// ---------------------------------------------------------------------------
// Display views
// ---------------------------------------------------------------------------

/// One resource as presented to a user choosing what to merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub key: ResourceKey,
    pub type_name: String,
    pub size: usize,
    pub source: Source,
}

impl ResourceInfo {
    fn of(container: &Container, key: &ResourceKey, source: Source) -> Option<Self> {
        let resource = container.get(key)?;
        Some(Self {
            key: *key,
            type_name: resource.type_name(),
            size: resource.len(),
            source,
        })
    }
}

/// Resources only the older save has, sorted by type name then key.
pub fn mergeable_resources(summary: &ComparisonSummary, older: &Container) -> Vec<ResourceInfo> {
    let mut out: Vec<ResourceInfo> = summary
        .only_b
        .iter()
        .filter_map(|k| ResourceInfo::of(older, k, Source::Older))
        .collect();
    out.sort_by(|x, y| (&x.type_name, x.key).cmp(&(&y.type_name, y.key)));
    out
}

/// `(newer, older)` views of every differing resource, sorted by key.
pub fn conflicting_resources(
    summary: &ComparisonSummary,
    newer: &Container,
    older: &Container,
) -> Vec<(ResourceInfo, ResourceInfo)> {
    let mut keys: Vec<&ResourceKey> = summary.common_different.iter().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|k| {
            Some((
                ResourceInfo::of(newer, k, Source::Newer)?,
                ResourceInfo::of(older, k, Source::Older)?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbpf::{Resource, types};

    fn key(n: u64) -> ResourceKey {
        ResourceKey::new(types::LOT, 0, n)
    }

    fn container(entries: &[(u64, &[u8])]) -> Container {
        entries
            .iter()
            .map(|(n, data)| Resource::new(key(*n), data.to_vec()))
            .collect()
    }

    #[test]
    fn scenario_partition() {
        let a = container(&[(1, b"x"), (2, b"y")]);
        let b = container(&[(1, b"x"), (3, b"z")]);
        let s = compare(&a, &b);
        assert_eq!(s.only_a, HashSet::from([key(2)]));
        assert_eq!(s.only_b, HashSet::from([key(3)]));
        assert_eq!(s.common_same, HashSet::from([key(1)]));
        assert!(s.common_different.is_empty());
        assert_eq!(s.total(), 3);
        assert!(!s.is_identical());
    }

    #[test]
    fn differing_bytes_same_length() {
        let a = container(&[(1, b"abc")]);
        let b = container(&[(1, b"abd")]);
        let s = compare(&a, &b);
        assert_eq!(s.common_different, HashSet::from([key(1)]));
    }

    #[test]
    fn identical_containers() {
        let a = container(&[(1, b"x"), (2, b"")]);
        assert!(compare(&a, &a.clone()).is_identical());
        assert!(compare(&Container::new(), &Container::new()).is_identical());
    }

    #[test]
    fn by_type_counts() {
        let mut a = container(&[(1, b"x"), (2, b"y")]);
        a.insert(Resource::new(ResourceKey::new(types::SIM_INFO, 0, 1), b"s".to_vec()));
        let b = container(&[(1, b"changed")]);
        let t = compare(&a, &b).by_type();
        assert_eq!(t.only_a.get("Lot"), Some(&1));
        assert_eq!(t.only_a.get("SimInfo"), Some(&1));
        assert_eq!(t.common_different.get("Lot"), Some(&1));
        assert!(t.only_b.is_empty());
    }

    #[test]
    fn resource_views() {
        let newer = container(&[(1, b"new"), (2, b"same")]);
        let mut older = container(&[(1, b"older!"), (2, b"same"), (9, b"gone")]);
        older.insert(Resource::new(ResourceKey::new(types::HOUSEHOLD, 0, 4), b"hh".to_vec()));
        let s = compare(&newer, &older);

        let add = mergeable_resources(&s, &older);
        let names: Vec<_> = add.iter().map(|r| r.type_name.as_str()).collect();
        assert_eq!(names, ["Household", "Lot"]);
        assert!(add.iter().all(|r| r.source == Source::Older));

        let conflicts = conflicting_resources(&s, &newer, &older);
        assert_eq!(conflicts.len(), 1);
        let (n, o) = &conflicts[0];
        assert_eq!((n.size, o.size), (3, 6));
        assert_eq!((n.source, o.source), (Source::Newer, Source::Older));
    }
}
