//! Folding linked test pairs into per-infection clusters.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;

use super::link::StayIndex;
use crate::config::{LinkParams, MergeStrategy};
use crate::models::{Cluster, ClusterMap, TestRecord};

/// Two linked positive tests of different patients.
#[derive(Debug, Clone, Copy)]
pub struct LinkedPair<'a> {
    pub first: &'a TestRecord,
    pub second: &'a TestRecord,
}

impl LinkedPair<'_> {
    fn days(&self) -> (NaiveDate, NaiveDate) {
        let a = self.first.collection_day();
        let b = self.second.collection_day();
        (a.min(b), a.max(b))
    }
}

/// Builds clusters for every infection present in a set of positive tests.
pub struct ClusterAssembler<'a> {
    index: &'a StayIndex,
    params: LinkParams,
    strategy: MergeStrategy,
}

impl<'a> ClusterAssembler<'a> {
    pub fn new(index: &'a StayIndex, params: LinkParams, strategy: MergeStrategy) -> Self {
        Self {
            index,
            params,
            strategy,
        }
    }

    /// Cluster every infection. Tests are enumerated in the order given, so
    /// callers must pass a stable ordering for reproducible greedy output.
    pub fn assemble(&self, tests: &[TestRecord]) -> ClusterMap {
        let mut by_infection: BTreeMap<&str, Vec<&TestRecord>> = BTreeMap::new();
        for test in tests.iter().filter(|t| t.is_positive()) {
            by_infection.entry(test.infection.as_str()).or_default().push(test);
        }

        by_infection
            .into_iter()
            .map(|(infection, tests)| {
                let clusters = self.assemble_infection(infection, &tests);
                tracing::debug!(
                    infection,
                    tests = tests.len(),
                    clusters = clusters.len(),
                    strategy = %self.strategy,
                    "Assembled clusters"
                );
                (infection.to_string(), clusters)
            })
            .collect()
    }

    /// Cluster the positive tests of one infection.
    pub fn assemble_infection(&self, infection: &str, tests: &[&TestRecord]) -> Vec<Cluster> {
        let pairs = self.linked_pairs(tests);
        match self.strategy {
            MergeStrategy::Greedy => greedy_merge(infection, &pairs),
            MergeStrategy::ConnectedComponents => component_merge(infection, &pairs),
        }
    }

    /// Enumerate unordered test pairs `(i, j)`, `i < j`, and keep those that
    /// link. Once two patients link, further tests of the same two patients
    /// are not evaluated; a pair that failed to link stays eligible.
    pub fn linked_pairs<'t>(&self, tests: &[&'t TestRecord]) -> Vec<LinkedPair<'t>> {
        let mut linked: HashSet<(&str, &str)> = HashSet::new();
        let mut overlap_cache: HashMap<(&str, &str), bool> = HashMap::new();
        let mut pairs = Vec::new();

        for (i, &t1) in tests.iter().enumerate() {
            for &t2 in &tests[i + 1..] {
                if t1.patient_id == t2.patient_id {
                    continue;
                }
                let key = patient_key(&t1.patient_id, &t2.patient_id);
                if linked.contains(&key) {
                    continue;
                }
                if !self.links_cached(t1, t2, key, &mut overlap_cache) {
                    continue;
                }
                linked.insert(key);
                pairs.push(LinkedPair {
                    first: t1,
                    second: t2,
                });
            }
        }

        pairs
    }

    // Same answer as `StayIndex::links`; the location half only depends on the
    // two patients, so it is computed once per pair.
    fn links_cached<'t>(
        &self,
        t1: &'t TestRecord,
        t2: &'t TestRecord,
        key: (&'t str, &'t str),
        overlap_cache: &mut HashMap<(&'t str, &'t str), bool>,
    ) -> bool {
        let unconstrained = LinkParams {
            require_location_overlap: false,
            ..self.params
        };
        if !self.index.links(t1, t2, &unconstrained) {
            return false;
        }
        if !self.params.require_location_overlap {
            return true;
        }
        *overlap_cache
            .entry(key)
            .or_insert_with(|| self.index.share_location(key.0, key.1))
    }
}

fn patient_key<'t>(a: &'t str, b: &'t str) -> (&'t str, &'t str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

struct PendingCluster {
    patients: BTreeSet<String>,
    start: NaiveDate,
    end: NaiveDate,
}

impl PendingCluster {
    fn from_pair(pair: &LinkedPair<'_>) -> Self {
        let (start, end) = pair.days();
        Self {
            patients: [pair.first.patient_id.clone(), pair.second.patient_id.clone()]
                .into_iter()
                .collect(),
            start,
            end,
        }
    }

    fn touches(&self, pair: &LinkedPair<'_>) -> bool {
        self.patients.contains(&pair.first.patient_id)
            || self.patients.contains(&pair.second.patient_id)
    }

    fn absorb(&mut self, pair: &LinkedPair<'_>) {
        self.patients.insert(pair.first.patient_id.clone());
        self.patients.insert(pair.second.patient_id.clone());
        let (start, end) = pair.days();
        self.start = self.start.min(start);
        self.end = self.end.max(end);
    }

    fn finish(self, infection: &str) -> Cluster {
        Cluster {
            infection: infection.to_string(),
            patients: self.patients.into_iter().collect(),
            start_date: self.start,
            end_date: self.end,
        }
    }
}

/// Each pair joins the first cluster (in creation order) that already holds
/// either patient, widening its dates; otherwise it founds a new cluster.
///
/// A pair bridging two existing clusters only extends the first one, so the
/// bridging patient can end up listed in both.
pub fn greedy_merge(infection: &str, pairs: &[LinkedPair<'_>]) -> Vec<Cluster> {
    let mut clusters: Vec<PendingCluster> = Vec::new();

    for pair in pairs {
        match clusters.iter_mut().find(|c| c.touches(pair)) {
            Some(cluster) => cluster.absorb(pair),
            None => clusters.push(PendingCluster::from_pair(pair)),
        }
    }

    clusters.into_iter().map(|c| c.finish(infection)).collect()
}

/// Connected components of the patient link graph. Dates span every linked
/// pair inside the component. Components are ordered by their first pair.
pub fn component_merge(infection: &str, pairs: &[LinkedPair<'_>]) -> Vec<Cluster> {
    let mut sets = DisjointSet::default();
    for pair in pairs {
        sets.union(&pair.first.patient_id, &pair.second.patient_id);
    }

    let mut order: Vec<usize> = Vec::new();
    let mut components: HashMap<usize, PendingCluster> = HashMap::new();
    for pair in pairs {
        let root = sets.find_existing(&pair.first.patient_id);
        match components.get_mut(&root) {
            Some(cluster) => cluster.absorb(pair),
            None => {
                order.push(root);
                components.insert(root, PendingCluster::from_pair(pair));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|root| components.remove(&root))
        .map(|c| c.finish(infection))
        .collect()
}

/// Union-find over patient IDs with path compression and union by size.
#[derive(Default)]
struct DisjointSet {
    ids: HashMap<String, usize>,
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn id(&mut self, patient: &str) -> usize {
        if let Some(&id) = self.ids.get(patient) {
            return id;
        }
        let id = self.parent.len();
        self.ids.insert(patient.to_string(), id);
        self.parent.push(id);
        self.size.push(1);
        id
    }

    fn root(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: &str, b: &str) {
        let a = self.id(a);
        let b = self.id(b);
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] { (ra, rb) } else { (rb, ra) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }

    // Only called for patients already passed to `union`.
    fn find_existing(&mut self, patient: &str) -> usize {
        let id = self.id(patient);
        self.root(id)
    }
}
