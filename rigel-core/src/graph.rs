//! Undirected graphs over a sparse adjacency pattern.
//!
//! Used to find rigid groups: every applicable rigid element links its member
//! nodes, and each connected component of the resulting graph moves as one
//! rigid body.

use crate::error::Result;
use crate::sparse::{CsrMatrix, TripletMatrix};
use std::collections::VecDeque;

/// Symmetric adjacency pattern stored as a CSR matrix of ones.
#[derive(Debug, Clone)]
pub struct SparseGraph {
    adjacency: CsrMatrix,
}

impl SparseGraph {
    /// Build a graph on `n` vertices from undirected edges.
    ///
    /// `(v, v)` self loops mark a vertex as taking part in the graph without
    /// linking it to anything else.
    pub fn from_edges(n: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Result<Self> {
        let mut triplets = TripletMatrix::new(n, n);
        for (a, b) in edges {
            triplets.add_exact(a, b, 1.0);
            if a != b {
                triplets.add_exact(b, a, 1.0);
            }
        }
        Ok(Self {
            adjacency: triplets.to_csr()?,
        })
    }

    /// Number of vertices.
    pub fn n_vertices(&self) -> usize {
        self.adjacency.nrows()
    }

    /// Neighbors of `v`, sorted, including `v` itself when it has a self loop.
    pub fn neighbors(&self, v: usize) -> &[usize] {
        let offsets = self.adjacency.row_offsets();
        &self.adjacency.col_indices()[offsets[v]..offsets[v + 1]]
    }

    /// A vertex with no stored entry at all.
    pub fn is_isolated(&self, v: usize) -> bool {
        self.neighbors(v).is_empty()
    }

    /// Breadth-first traversal from `start`, marking vertices in `visited`.
    ///
    /// Returns the vertices reached, in visit order. Already visited vertices
    /// are not re-entered, so repeated calls partition the graph.
    pub fn traverse(&self, start: usize, visited: &mut [bool]) -> Vec<usize> {
        let mut order = Vec::new();
        if visited[start] {
            return order;
        }
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(v) = queue.pop_front() {
            order.push(v);
            for &w in self.neighbors(v) {
                if !visited[w] {
                    visited[w] = true;
                    queue.push_back(w);
                }
            }
        }
        order
    }

    /// Connected components in order of their lowest vertex.
    ///
    /// Isolated vertices are skipped. Members of each component are sorted
    /// ascending.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.n_vertices();
        let mut visited: Vec<bool> = (0..n).map(|v| self.is_isolated(v)).collect();
        let mut components = Vec::new();
        for v in 0..n {
            if visited[v] {
                continue;
            }
            let mut members = self.traverse(v, &mut visited);
            members.sort_unstable();
            components.push(members);
        }
        components
    }

    /// Component label per vertex: `0` for isolated vertices, `1..` otherwise.
    pub fn component_labels(&self) -> Vec<usize> {
        let mut labels = vec![0; self.n_vertices()];
        for (k, members) in self.connected_components().iter().enumerate() {
            for &v in members {
                labels[v] = k + 1;
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_skip_isolated() {
        // 0-1-2   3 (isolated)   4-5
        let g = SparseGraph::from_edges(6, vec![(0, 1), (1, 2), (4, 5)]).unwrap();
        let comps = g.connected_components();
        assert_eq!(comps, vec![vec![0, 1, 2], vec![4, 5]]);
        assert!(g.is_isolated(3));
        assert_eq!(g.component_labels(), vec![1, 1, 1, 0, 2, 2]);
    }

    #[test]
    fn test_self_loop_forms_singleton_component() {
        let g = SparseGraph::from_edges(3, vec![(1, 1)]).unwrap();
        assert_eq!(g.connected_components(), vec![vec![1]]);
    }

    #[test]
    fn test_traverse_breadth_first() {
        // Star centred on 0 plus a tail 3-4
        let g = SparseGraph::from_edges(5, vec![(0, 1), (0, 2), (0, 3), (3, 4)]).unwrap();
        let mut visited = vec![false; 5];
        let order = g.traverse(0, &mut visited);
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(visited.iter().all(|v| *v));
        assert!(g.traverse(2, &mut visited).is_empty());
    }

    #[test]
    fn test_components_are_deterministic() {
        let edges = vec![(5, 2), (2, 7), (0, 3), (9, 9)];
        let a = SparseGraph::from_edges(10, edges.clone()).unwrap();
        let b = SparseGraph::from_edges(10, edges).unwrap();
        assert_eq!(a.connected_components(), b.connected_components());
        assert_eq!(a.connected_components(), vec![vec![0, 3], vec![2, 5, 7], vec![9]]);
    }
}
