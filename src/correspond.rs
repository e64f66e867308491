//! Correspondence of chromatographic features across analyses.
//!
//! Each feature occupies a 2-D interval (m/z range x rt range). Features
//! whose intervals overlap, transitively, belong to one group: connected
//! components over the overlap relation, computed with a union-find after a
//! sort-and-sweep over `mz_min`. Two features from the same analysis may
//! share a group; deduplication is the caller's policy.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CorrespondenceError {
    #[error("Feature {0} has a non-finite m/z or rt range")]
    NonFiniteRange(usize),
    #[error("Feature {0} has an inverted m/z or rt range")]
    InvertedRange(usize),
    #[error("Features {0} and {1} share the key ({2}, {3})")]
    DuplicateKey(usize, usize, String, String),
}

/// One chromatographic detection from one analysis.
///
/// The `(analysis, feature)` pair is the feature's identity and must be
/// unique across the input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub analysis: String,
    pub feature: String,
    pub mz_min: f64,
    pub mz_max: f64,
    pub rt_min: f64,
    pub rt_max: f64,
    pub intensity: f64,
}

impl Feature {
    fn key(&self) -> (String, String) {
        (self.analysis.clone(), self.feature.clone())
    }

    /// Closed-interval overlap in both dimensions
    fn overlaps(&self, other: &Self) -> bool {
        self.mz_min <= other.mz_max
            && other.mz_min <= self.mz_max
            && self.rt_min <= other.rt_max
            && other.rt_min <= self.rt_max
    }
}

/// A set of features believed to be the same chemical entity across analyses
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureGroup {
    pub id: u64,
    /// Union of the member m/z ranges
    pub mz_min: f64,
    pub mz_max: f64,
    /// Union of the member rt ranges
    pub rt_min: f64,
    pub rt_max: f64,
    /// Member `(analysis, feature)` keys, sorted
    pub members: Vec<(String, String)>,
}

impl FeatureGroup {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// The result of one correspondence pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Correspondence {
    /// Groups ordered by their earliest member in the input
    pub groups: Vec<FeatureGroup>,
    /// Group id per input feature, in input order
    pub assignments: Vec<u64>,
    index: IndexMap<(String, String), u64>,
}

impl Correspondence {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The group id of a feature by its identity key
    pub fn group_of(&self, analysis: &str, feature: &str) -> Option<u64> {
        self.index
            .get(&(analysis.to_string(), feature.to_string()))
            .copied()
    }

    fn max_id(&self) -> u64 {
        self.groups.iter().map(|g| g.id).max().unwrap_or(0)
    }
}

/// Disjoint-set forest with path compression and union by rank
struct Dsu {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl Dsu {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, item: usize) -> usize {
        let mut root = item;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = item;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let mut a = self.find(a);
        let mut b = self.find(b);
        if a == b {
            return;
        }
        if self.rank[a] < self.rank[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        if self.rank[a] == self.rank[b] {
            self.rank[a] += 1;
        }
    }
}

fn validate(features: &[Feature]) -> Result<(), CorrespondenceError> {
    let mut seen: IndexMap<(String, String), usize> = IndexMap::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let finite = feature.mz_min.is_finite()
            && feature.mz_max.is_finite()
            && feature.rt_min.is_finite()
            && feature.rt_max.is_finite();
        if !finite {
            return Err(CorrespondenceError::NonFiniteRange(index));
        }
        if feature.mz_min > feature.mz_max || feature.rt_min > feature.rt_max {
            return Err(CorrespondenceError::InvertedRange(index));
        }
        if let Some(&previous) = seen.get(&feature.key()) {
            return Err(CorrespondenceError::DuplicateKey(
                previous,
                index,
                feature.analysis.clone(),
                feature.feature.clone(),
            ));
        }
        seen.insert(feature.key(), index);
    }
    Ok(())
}

/// Compute the connected components of the overlap relation
fn components(features: &[Feature]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..features.len()).collect();
    order.sort_by(|&a, &b| {
        features[a]
            .mz_min
            .partial_cmp(&features[b].mz_min)
            .expect("ranges were checked finite")
    });

    let mut dsu = Dsu::new(features.len());
    for (position, &a) in order.iter().enumerate() {
        for &b in order[position + 1..].iter() {
            // sorted by mz_min, so once past the m/z extent nothing later
            // can overlap this feature
            if features[b].mz_min > features[a].mz_max {
                break;
            }
            if features[a].overlaps(&features[b]) {
                dsu.union(a, b);
            }
        }
    }

    let mut by_root: IndexMap<usize, Vec<usize>> = IndexMap::new();
    for index in 0..features.len() {
        let root = dsu.find(index);
        by_root.entry(root).or_default().push(index);
    }
    // group order follows the earliest member in the input
    let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
    groups.sort_by_key(|members| members[0]);
    groups
}

fn build_group(id: u64, members: &[usize], features: &[Feature]) -> FeatureGroup {
    let mut mz_min = f64::INFINITY;
    let mut mz_max = f64::NEG_INFINITY;
    let mut rt_min = f64::INFINITY;
    let mut rt_max = f64::NEG_INFINITY;
    let mut keys: Vec<(String, String)> = Vec::with_capacity(members.len());
    for &index in members {
        let feature = &features[index];
        mz_min = mz_min.min(feature.mz_min);
        mz_max = mz_max.max(feature.mz_max);
        rt_min = rt_min.min(feature.rt_min);
        rt_max = rt_max.max(feature.rt_max);
        keys.push(feature.key());
    }
    keys.sort();
    FeatureGroup {
        id,
        mz_min,
        mz_max,
        rt_min,
        rt_max,
        members: keys,
    }
}

fn assemble(
    features: &[Feature],
    member_sets: Vec<Vec<usize>>,
    mut assign_id: impl FnMut(&BTreeSet<(String, String)>) -> u64,
) -> Correspondence {
    let mut result = Correspondence {
        assignments: vec![0; features.len()],
        ..Default::default()
    };
    for members in member_sets {
        let key_set: BTreeSet<(String, String)> =
            members.iter().map(|&i| features[i].key()).collect();
        let id = assign_id(&key_set);
        let group = build_group(id, &members, features);
        for &index in members.iter() {
            result.assignments[index] = id;
            result.index.insert(features[index].key(), id);
        }
        result.groups.push(group);
    }
    result
}

/// Group all `features` from scratch. Group ids are assigned sequentially
/// from 1 in order of each group's earliest member.
pub fn correspond(features: &[Feature]) -> Result<Correspondence, CorrespondenceError> {
    validate(features)?;
    let member_sets = components(features);
    let mut next_id = 0;
    Ok(assemble(features, member_sets, |_| {
        next_id += 1;
        next_id
    }))
}

/// Re-derive groups after features were added, removed, or relabeled.
///
/// A group whose member key set is exactly unchanged keeps its prior id;
/// every other group, split, merged, or new, receives a fresh id past the
/// prior maximum, retiring the old ids.
pub fn update_groups(
    features: &[Feature],
    prior: &Correspondence,
) -> Result<Correspondence, CorrespondenceError> {
    validate(features)?;
    let member_sets = components(features);

    let prior_by_members: IndexMap<BTreeSet<(String, String)>, u64> = prior
        .groups
        .iter()
        .map(|group| (group.members.iter().cloned().collect(), group.id))
        .collect();

    let mut next_id = prior.max_id();
    Ok(assemble(features, member_sets, |key_set| {
        if let Some(&id) = prior_by_members.get(key_set) {
            id
        } else {
            next_id += 1;
            next_id
        }
    }))
}
