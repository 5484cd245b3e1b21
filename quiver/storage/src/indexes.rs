use std::ops::Bound;
use std::sync::Arc;

use crossbeam_skiplist::{SkipMap, SkipSet};
use dashmap::DashMap;
use quiver_common::{Gid, IndexOrd, LabelId, PropertyId, PropertyValue};

/// Inclusive or exclusive bound of a label-property range scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanBound {
    Inclusive(PropertyValue),
    Exclusive(PropertyValue),
}

impl ScanBound {
    pub fn value(&self) -> &PropertyValue {
        match self {
            ScanBound::Inclusive(value) | ScanBound::Exclusive(value) => value,
        }
    }
}

/// For each label, the set of vertex gids that carried the label at some
/// committed version. Entries are added eagerly by writers; readers must
/// re-check visibility against their snapshot, and the garbage collector
/// prunes entries whose record no longer backs them.
#[derive(Debug, Default)]
pub struct LabelIndex {
    sets: DashMap<LabelId, Arc<SkipSet<Gid>>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, label: LabelId, gid: Gid) {
        self.sets
            .entry(label)
            .or_insert_with(|| Arc::new(SkipSet::new()))
            .insert(gid);
    }

    pub fn remove(&self, label: LabelId, gid: Gid) {
        if let Some(set) = self.sets.get(&label) {
            set.remove(&gid);
        }
    }

    pub fn vertices(&self, label: LabelId) -> Vec<Gid> {
        self.sets
            .get(&label)
            .map(|set| set.iter().map(|entry| *entry.value()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, label: LabelId) -> usize {
        self.sets.get(&label).map(|set| set.len()).unwrap_or(0)
    }

    /// Garbage-collection hook: drops entries the predicate rejects.
    pub fn retain<F>(&self, keep: F)
    where
        F: Fn(LabelId, Gid) -> bool,
    {
        for entry in self.sets.iter() {
            let label = *entry.key();
            for member in entry.value().iter() {
                if !keep(label, *member.value()) {
                    entry.value().remove(member.value());
                }
            }
        }
    }
}

/// Composite key of the ordered label-property index: the property value in
/// its total index order, then the gid so equal values form a contiguous
/// run of distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PropertyKey {
    value: IndexOrd,
    gid: Gid,
}

/// For each `(label, property)` pair registered by `build_index`, an ordered
/// map from property value to the vertices carrying it. Supports point
/// lookups and range scans with optional inclusive/exclusive bounds; values
/// without a defined order sort into a tail bucket that range scans skip.
#[derive(Debug, Default)]
pub struct LabelPropertyIndex {
    maps: DashMap<(LabelId, PropertyId), Arc<SkipMap<PropertyKey, ()>>>,
}

impl LabelPropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `(label, property)` key so subsequent writes maintain
    /// it. Returns false when the index already existed.
    pub fn register(&self, label: LabelId, property: PropertyId) -> bool {
        let mut created = false;
        self.maps.entry((label, property)).or_insert_with(|| {
            created = true;
            Arc::new(SkipMap::new())
        });
        created
    }

    pub fn exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.maps.contains_key(&(label, property))
    }

    /// All registered `(label, property)` keys for the given label.
    pub fn keys_for_label(&self, label: LabelId) -> Vec<(LabelId, PropertyId)> {
        self.maps
            .iter()
            .map(|entry| *entry.key())
            .filter(|(key_label, _)| *key_label == label)
            .collect()
    }

    /// Adds an entry if the `(label, property)` index is registered.
    pub fn add(&self, label: LabelId, property: PropertyId, value: &PropertyValue, gid: Gid) {
        if let Some(map) = self.maps.get(&(label, property)) {
            map.insert(
                PropertyKey {
                    value: IndexOrd(value.clone()),
                    gid,
                },
                (),
            );
        }
    }

    pub fn remove(&self, label: LabelId, property: PropertyId, value: &PropertyValue, gid: Gid) {
        if let Some(map) = self.maps.get(&(label, property)) {
            map.remove(&PropertyKey {
                value: IndexOrd(value.clone()),
                gid,
            });
        }
    }

    /// Vertices whose indexed value equals `value`.
    pub fn vertices_by_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> Vec<Gid> {
        let Some(map) = self.maps.get(&(label, property)) else {
            return Vec::new();
        };
        let lower = PropertyKey {
            value: IndexOrd(value.clone()),
            gid: Gid::from_raw(0),
        };
        let upper = PropertyKey {
            value: IndexOrd(value.clone()),
            gid: Gid::from_raw(u64::MAX),
        };
        map.range((Bound::Included(lower), Bound::Included(upper)))
            .map(|entry| entry.key().gid)
            .collect()
    }

    /// Vertices whose indexed value falls in the given range. With both
    /// bounds absent this degenerates to the full label-property scan;
    /// otherwise entries without a defined order are never matched.
    pub fn vertices_by_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&ScanBound>,
        upper: Option<&ScanBound>,
    ) -> Vec<Gid> {
        let Some(map) = self.maps.get(&(label, property)) else {
            return Vec::new();
        };
        if lower.is_none() && upper.is_none() {
            return map.iter().map(|entry| entry.key().gid).collect();
        }

        let lower_bound = match lower {
            None => Bound::Unbounded,
            Some(ScanBound::Inclusive(value)) => Bound::Included(PropertyKey {
                value: IndexOrd(value.clone()),
                gid: Gid::from_raw(0),
            }),
            Some(ScanBound::Exclusive(value)) => Bound::Excluded(PropertyKey {
                value: IndexOrd(value.clone()),
                gid: Gid::from_raw(u64::MAX),
            }),
        };
        let upper_bound = match upper {
            None => Bound::Unbounded,
            Some(ScanBound::Inclusive(value)) => Bound::Included(PropertyKey {
                value: IndexOrd(value.clone()),
                gid: Gid::from_raw(u64::MAX),
            }),
            Some(ScanBound::Exclusive(value)) => Bound::Excluded(PropertyKey {
                value: IndexOrd(value.clone()),
                gid: Gid::from_raw(0),
            }),
        };
        let reference = lower
            .map(ScanBound::value)
            .or_else(|| upper.map(ScanBound::value));
        map.range((lower_bound, upper_bound))
            .filter(|entry| match reference {
                Some(bound_value) => entry.key().value.0.comparable_with(bound_value),
                None => entry.key().value.0.is_orderable(),
            })
            .map(|entry| entry.key().gid)
            .collect()
    }

    pub fn count(&self, label: LabelId, property: PropertyId) -> usize {
        self.maps
            .get(&(label, property))
            .map(|map| map.len())
            .unwrap_or(0)
    }

    pub fn count_by_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> usize {
        self.vertices_by_value(label, property, value).len()
    }

    pub fn count_by_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&ScanBound>,
        upper: Option<&ScanBound>,
    ) -> usize {
        self.vertices_by_range(label, property, lower, upper).len()
    }

    /// Garbage-collection hook: drops entries the predicate rejects.
    pub fn retain<F>(&self, keep: F)
    where
        F: Fn(LabelId, PropertyId, &PropertyValue, Gid) -> bool,
    {
        for entry in self.maps.iter() {
            let (label, property) = *entry.key();
            for member in entry.value().iter() {
                let key = member.key();
                if !keep(label, property, &key.value.0, key.gid) {
                    entry.value().remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn label(raw: u32) -> LabelId {
        NonZeroU32::new(raw).unwrap()
    }

    fn gid(local: u64) -> Gid {
        Gid::new(0, local)
    }

    #[test]
    fn label_index_counts_members() {
        let index = LabelIndex::new();
        index.add(label(1), gid(1));
        index.add(label(1), gid(2));
        index.add(label(2), gid(3));
        assert_eq!(index.count(label(1)), 2);
        assert_eq!(index.count(label(2)), 1);
        index.remove(label(1), gid(2));
        assert_eq!(index.vertices(label(1)), vec![gid(1)]);
    }

    #[test]
    fn point_lookup_finds_all_gids_for_a_value() {
        let index = LabelPropertyIndex::new();
        index.register(label(1), 7);
        index.add(label(1), 7, &PropertyValue::Int(5), gid(1));
        index.add(label(1), 7, &PropertyValue::Int(5), gid(2));
        index.add(label(1), 7, &PropertyValue::Int(6), gid(3));
        let mut found = index.vertices_by_value(label(1), 7, &PropertyValue::Int(5));
        found.sort();
        assert_eq!(found, vec![gid(1), gid(2)]);
        assert_eq!(index.count_by_value(label(1), 7, &PropertyValue::Int(5)), 2);
    }

    #[test]
    fn range_scan_honors_bound_kinds() {
        let index = LabelPropertyIndex::new();
        index.register(label(1), 7);
        for value in 0..10i64 {
            index.add(label(1), 7, &PropertyValue::Int(value), gid(value as u64));
        }
        let inclusive = index.vertices_by_range(
            label(1),
            7,
            Some(&ScanBound::Inclusive(PropertyValue::Int(3))),
            Some(&ScanBound::Inclusive(PropertyValue::Int(5))),
        );
        assert_eq!(inclusive.len(), 3);
        let exclusive = index.vertices_by_range(
            label(1),
            7,
            Some(&ScanBound::Exclusive(PropertyValue::Int(3))),
            Some(&ScanBound::Exclusive(PropertyValue::Int(5))),
        );
        assert_eq!(exclusive, vec![gid(4)]);
        let upper_only = index.vertices_by_range(
            label(1),
            7,
            None,
            Some(&ScanBound::Inclusive(PropertyValue::Int(5))),
        );
        assert_eq!(upper_only.len(), 6);
    }

    #[test]
    fn unbounded_scan_includes_everything_but_ranges_skip_unorderables() {
        let index = LabelPropertyIndex::new();
        index.register(label(1), 7);
        index.add(label(1), 7, &PropertyValue::Int(1), gid(1));
        index.add(
            label(1),
            7,
            &PropertyValue::List(vec![PropertyValue::Int(1)]),
            gid(2),
        );
        assert_eq!(index.vertices_by_range(label(1), 7, None, None).len(), 2);
        let bounded = index.vertices_by_range(
            label(1),
            7,
            Some(&ScanBound::Inclusive(PropertyValue::Int(0))),
            None,
        );
        assert_eq!(bounded, vec![gid(1)]);
    }
}
