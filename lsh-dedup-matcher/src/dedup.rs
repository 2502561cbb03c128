use std::collections::{HashMap, HashSet};
use tracing::warn;

///
/// Wraps two mappings to determine duplicate clusters from the scored edges
/// of the match graph.
///
pub struct DeduplicationTable {
    /// Mapping of duplicate group id to record indices
    duplicate_groups: HashMap<usize, HashSet<usize>>,
    /// Reverse lookup to identify the group id of a record index
    doc_lookup: HashMap<usize, usize>,
}

impl DeduplicationTable {
    ///
    /// Builds the connected components of the graph whose edges are `matches`.
    /// Records without any edge are left out.
    ///
    pub fn new(matches: &[(usize, usize)]) -> Self {
        let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(a, b) in matches {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
        let mut query_results: Vec<(usize, Vec<usize>)> = adjacency.into_iter().collect();
        query_results.sort_unstable_by_key(|(idx, _)| *idx);
        Self::from_query_results(query_results)
    }

    ///
    /// Outputs the record indices of every group, each group sorted and groups
    /// ordered by their smallest member.
    ///
    pub fn grouped_ids(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = self
            .duplicate_groups
            .values()
            .map(|set| {
                let mut group: Vec<usize> = set.iter().copied().collect();
                group.sort_unstable();
                group
            })
            .collect();
        groups.sort_unstable_by_key(|group| group[0]);
        groups
    }

    fn init() -> Self {
        Self {
            duplicate_groups: HashMap::new(),
            doc_lookup: HashMap::new(),
        }
    }

    fn from_query_results(query_results: Vec<(usize, Vec<usize>)>) -> Self {
        let mut document_clusters = Self::init();
        for (query_doc, similar_documents) in query_results {
            let cluster_id = document_clusters
                .check_cluster_id(query_doc)
                .unwrap_or_else(|| document_clusters.new_id());
            let mut current_cluster = HashSet::from([query_doc]);
            for similar_doc in similar_documents {
                match document_clusters.check_cluster_id(similar_doc) {
                    Some(prev_cluster_id) if prev_cluster_id != cluster_id => {
                        let reassignment = document_clusters.remove(prev_cluster_id);
                        current_cluster.extend(reassignment);
                    }
                    Some(_) => {}
                    None => {
                        current_cluster.insert(similar_doc);
                    }
                }
            }
            document_clusters.update(cluster_id, current_cluster);
        }
        document_clusters
    }

    fn update(&mut self, cluster_id: usize, doc_set: HashSet<usize>) {
        for doc in doc_set {
            self.add(cluster_id, doc);
        }
    }

    fn add(&mut self, cluster_id: usize, doc: usize) {
        self.duplicate_groups
            .entry(cluster_id)
            .or_insert_with(HashSet::new)
            .insert(doc);
        self.doc_lookup.insert(doc, cluster_id);
    }

    fn check_cluster_id(&self, doc: usize) -> Option<usize> {
        self.doc_lookup.get(&doc).copied()
    }

    fn new_id(&self) -> usize {
        self.duplicate_groups.keys().max().map_or(0, |&v| v + 1)
    }

    fn remove(&mut self, cluster_id: usize) -> HashSet<usize> {
        let set = self.duplicate_groups.remove(&cluster_id).unwrap_or_default();
        for k in set.iter() {
            self.doc_lookup.remove(k);
        }
        set
    }
}

/// Connected components of the graph of scored `edges`, none larger than
/// `max_size`.
///
/// An oversized component has its threshold raised to its weakest edge score:
/// those edges are dropped and the rest is split again. Records left without
/// any edge drop out of the result.
pub fn bounded_components(edges: &[(usize, usize, f64)], max_size: usize) -> Vec<Vec<usize>> {
    let pairs: Vec<(usize, usize)> = edges.iter().map(|&(a, b, _)| (a, b)).collect();
    let groups = DeduplicationTable::new(&pairs).grouped_ids();

    let mut group_of: HashMap<usize, usize> = HashMap::new();
    for (group_idx, group) in groups.iter().enumerate() {
        if group.len() > max_size {
            group_of.extend(group.iter().map(|&member| (member, group_idx)));
        }
    }
    let mut oversized_edges: HashMap<usize, Vec<(usize, usize, f64)>> = HashMap::new();
    for &edge in edges {
        if let Some(&group_idx) = group_of.get(&edge.0) {
            oversized_edges.entry(group_idx).or_default().push(edge);
        }
    }

    let mut components = Vec::with_capacity(groups.len());
    for (group_idx, group) in groups.into_iter().enumerate() {
        let Some(group_edges) = oversized_edges.remove(&group_idx) else {
            components.push(group);
            continue;
        };
        let weakest = group_edges
            .iter()
            .map(|&(_, _, score)| score)
            .fold(f64::INFINITY, f64::min);
        warn!(
            size = group.len(),
            max_size,
            threshold = weakest,
            "component too large, dropping its weakest edges"
        );
        let stronger: Vec<(usize, usize, f64)> = group_edges
            .into_iter()
            .filter(|&(_, _, score)| score > weakest)
            .collect();
        components.extend(bounded_components(&stronger, max_size));
    }
    components.sort_unstable_by_key(|group| group[0]);
    components
}

/// Splits one connected component with average-linkage agglomeration: start
/// from singletons and keep merging the two clusters with the highest mean
/// pairwise score while that mean exceeds `threshold`.
///
/// `score(i, j)` is the match probability of members `i` and `j` and must be
/// symmetric.
pub fn split_component<F>(members: &[usize], threshold: f64, score: F) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> f64,
{
    let k = members.len();
    if k < 2 {
        return vec![members.to_vec()];
    }

    // Pairwise score sums between live clusters, indexed by slot.
    let mut sums = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in (i + 1)..k {
            let s = score(members[i], members[j]);
            sums[i][j] = s;
            sums[j][i] = s;
        }
    }
    let mut clusters: Vec<Option<Vec<usize>>> = members.iter().map(|&m| Some(vec![m])).collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..k {
            let Some(left) = &clusters[i] else { continue };
            for j in (i + 1)..k {
                let Some(right) = &clusters[j] else { continue };
                let mean = sums[i][j] / (left.len() * right.len()) as f64;
                if best.map_or(true, |(_, _, b)| mean > b) {
                    best = Some((i, j, mean));
                }
            }
        }
        match best {
            Some((i, j, mean)) if mean > threshold => {
                let absorbed = clusters[j].take().unwrap_or_default();
                if let Some(target) = clusters[i].as_mut() {
                    target.extend(absorbed);
                }
                for other in 0..k {
                    if other != i && other != j {
                        sums[i][other] += sums[j][other];
                        sums[other][i] = sums[i][other];
                    }
                }
            }
            _ => break,
        }
    }

    let mut groups: Vec<Vec<usize>> = clusters
        .into_iter()
        .flatten()
        .map(|mut group| {
            group.sort_unstable();
            group
        })
        .collect();
    groups.sort_unstable_by_key(|group| group[0]);
    groups
}

/// Confidence of each member: its mean score against the rest of the cluster.
/// A singleton is certain of itself.
pub fn member_confidence<F>(cluster: &[usize], score: F) -> Vec<f64>
where
    F: Fn(usize, usize) -> f64,
{
    if cluster.len() < 2 {
        return vec![1.0; cluster.len()];
    }
    let others = (cluster.len() - 1) as f64;
    cluster
        .iter()
        .map(|&member| {
            let total: f64 = cluster
                .iter()
                .filter(|&&other| other != member)
                .map(|&other| score(member, other))
                .sum();
            (total / others).clamp(0.0, 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_merge_transitively() {
        let table = DeduplicationTable::new(&[(0, 1), (3, 4), (1, 2), (4, 0)]);
        assert_eq!(table.grouped_ids(), vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn disjoint_components_stay_apart() {
        let table = DeduplicationTable::new(&[(5, 6), (0, 2)]);
        assert_eq!(table.grouped_ids(), vec![vec![0, 2], vec![5, 6]]);
    }

    #[test]
    fn chain_is_split_at_weak_link() {
        // 0-1 and 2-3 are strong, everything across is weak
        let score = |a: usize, b: usize| {
            let (a, b) = (a.min(b), a.max(b));
            match (a, b) {
                (0, 1) | (2, 3) => 0.9,
                (1, 2) => 0.6,
                _ => 0.1,
            }
        };
        let groups = split_component(&[0, 1, 2, 3], 0.5, score);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn small_components_pass_through_bounded() {
        let edges = [(0, 1, 0.7), (1, 2, 0.6), (5, 6, 0.9)];
        assert_eq!(
            bounded_components(&edges, 3),
            vec![vec![0, 1, 2], vec![5, 6]]
        );
    }

    #[test]
    fn oversized_component_loses_weakest_edges() {
        // 0-1-2 and 3-4-5 chained by a single weak link
        let edges = [
            (0, 1, 0.9),
            (1, 2, 0.8),
            (2, 3, 0.55),
            (3, 4, 0.9),
            (4, 5, 0.85),
            (7, 8, 0.6),
        ];
        let groups = bounded_components(&edges, 3);
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4, 5], vec![7, 8]]);
    }

    #[test]
    fn oversized_component_is_split_repeatedly() {
        // A chain whose scores rise along its length
        let edges: Vec<(usize, usize, f64)> = (0..10)
            .map(|i| (i, i + 1, 0.5 + i as f64 * 0.04))
            .collect();
        let groups = bounded_components(&edges, 4);
        assert!(groups.iter().all(|group| group.len() <= 4));
        assert_eq!(groups.last(), Some(&vec![7, 8, 9, 10]));
        let covered: HashSet<usize> = groups.iter().flatten().copied().collect();
        assert!(covered.iter().all(|&member| member <= 10));
    }

    #[test]
    fn uniform_oversized_component_dissolves() {
        let edges = [(0, 1, 0.7), (1, 2, 0.7), (2, 3, 0.7)];
        assert!(bounded_components(&edges, 2).is_empty());
    }

    #[test]
    fn tight_component_stays_whole() {
        let groups = split_component(&[4, 7, 9], 0.5, |_, _| 0.8);
        assert_eq!(groups, vec![vec![4, 7, 9]]);
    }

    #[test]
    fn confidence_is_mean_score_to_others() {
        let score = |a: usize, b: usize| if a.min(b) == 0 && a.max(b) == 1 { 1.0 } else { 0.5 };
        let confidence = member_confidence(&[0, 1, 2], score);
        assert_eq!(confidence, vec![0.75, 0.75, 0.5]);
        assert_eq!(member_confidence(&[3], score), vec![1.0]);
    }
}
