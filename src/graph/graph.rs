use std::collections::BTreeMap;

use ahash::AHashMap;

/// A weighted, undirected graph in compressed sparse row format.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    size: usize,
    offsets: Vec<u32>,
    edges: Vec<u32>,
    edge_weights: Vec<f64>,
}

impl Graph {
    /// Construct a graph from adjacency lists and matching edge weights.
    pub(crate) fn new(num_nodes: usize, edges: &[Vec<u32>], edge_weights: &[Vec<f64>]) -> Self {
        assert!(edges.len() == num_nodes, "edges.len() must equal num_nodes");
        assert!(edge_weights.len() == num_nodes, "edge_weights.len() must equal num_nodes");
        edges.iter().zip(edge_weights.iter()).enumerate().for_each(|(i, (edges, weights))| {
            assert!(edges.len() == weights.len(), "edges[{i}].len() must equal edge_weights[{i}].len()");
        });

        Self {
            size: num_nodes,
            offsets: std::iter::once(0u32).chain(
                edges.iter()
                    .map(|v| v.len() as u32)
                    .scan(0u32, |acc, len| {*acc += len; Some(*acc)})
            ).collect::<Vec<u32>>(),
            edges: edges.iter().flatten().copied().collect(),
            edge_weights: edge_weights.iter().flatten().copied().collect(),
        }
    }

    /// Build a symmetric graph from undirected `(a, b) -> weight` pairs.
    /// Neighbours of each node are listed in ascending order.
    pub(crate) fn from_pairs(num_nodes: usize, pairs: &BTreeMap<(u32, u32), f64>) -> Self {
        let mut edges = vec![Vec::new(); num_nodes];
        let mut weights = vec![Vec::new(); num_nodes];
        for (&(a, b), &w) in pairs {
            for (from, to) in [(a, b), (b, a)] {
                edges[from as usize].push(to);
                weights[from as usize].push(w);
            }
        }

        for node in 0..num_nodes {
            let mut row = edges[node].iter().copied().zip(weights[node].iter().copied()).collect::<Vec<_>>();
            row.sort_by_key(|&(to, _)| to);
            let (to, w): (Vec<u32>, Vec<f64>) = row.into_iter().unzip();
            edges[node] = to;
            weights[node] = w;
        }

        Self::new(num_nodes, &edges, &weights)
    }

    /// Rook adjacency of the units of a label grid: two units are neighbours when a pair
    /// of 4-neighbouring pixels carries their labels. Edge weights count shared pixel sides.
    ///
    /// `label(row, col)` returns `None` for masked pixels; `index` maps labels to nodes
    /// (labels missing from `index` are ignored).
    pub(crate) fn rook_adjacency(
        rows: usize,
        cols: usize,
        label: impl Fn(usize, usize) -> Option<i32>,
        index: &AHashMap<i32, u32>,
    ) -> Self {
        let node = |row: usize, col: usize| label(row, col).and_then(|v| index.get(&v).copied());

        let mut pairs: BTreeMap<(u32, u32), f64> = BTreeMap::new();
        for row in 0..rows {
            for col in 0..cols {
                let Some(a) = node(row, col) else { continue };
                let right = (col + 1 < cols).then(|| node(row, col + 1)).flatten();
                let below = (row + 1 < rows).then(|| node(row + 1, col)).flatten();
                for b in [right, below].into_iter().flatten() {
                    if a != b {
                        *pairs.entry((a.min(b), a.max(b))).or_insert(0.0) += 1.0;
                    }
                }
            }
        }

        Self::from_pairs(index.len(), &pairs)
    }

    /// Get the number of nodes in the graph.
    #[inline] pub(crate) fn node_count(&self) -> usize { self.size }

    /// Get the number of (directed) edge entries in the graph.
    #[inline] pub(crate) fn edge_count(&self) -> usize { self.edges.len() }

    /// Get the range of edges for a given node.
    #[inline]
    fn range(&self, node: usize) -> std::ops::Range<usize> {
        self.offsets[node] as usize .. self.offsets[node + 1] as usize
    }

    /// Get an iterator over the neighbors and edge weights of a given node.
    #[inline]
    pub(crate) fn edges_with_weights(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.range(node).map(move |v| (self.edges[v] as usize, self.edge_weights[v]))
    }
}
