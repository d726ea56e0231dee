//! Connectivity graph
//!
//! One [`NetworkNode`] per channel, one undirected [`NetworkEdge`] per
//! channel pair. Edges store their full per-bin weight vector; the scalar
//! [`NetworkEdge::weight`] is the mean over the network's active bin range,
//! so changing the frequency band never recomputes anything.
//!
//! ```rust
//! use phaselag_core::network::Network;
//!
//! let mut net = Network::new("PLI", 8.0, 8, 4);
//! let a = net.add_node(None);
//! let b = net.add_node(None);
//! net.add_edge(a, b, vec![0.0, 0.25, 0.5, 0.25, 0.0]).unwrap();
//!
//! net.set_frequency_range(2.0, 3.0).unwrap();
//! assert_eq!(net.edges()[0].weight(), 0.375);
//! ```

use std::collections::HashMap;

use crate::matrix::RealMatrix;
use crate::types::{num_freq_bins, ConnError, ConnResult, FrequencyBand};

/// A channel in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkNode {
    id: usize,
    position: Option<[f64; 3]>,
    edges: Vec<usize>,
}

impl NetworkNode {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Sensor position, when known.
    pub fn position(&self) -> Option<[f64; 3]> {
        self.position
    }

    /// Indices into [`Network::edges`] of every incident edge.
    pub fn edge_indices(&self) -> &[usize] {
        &self.edges
    }

    pub fn degree(&self) -> usize {
        self.edges.len()
    }
}

/// An undirected, weighted connection between two channels.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEdge {
    start: usize,
    end: usize,
    weights: Vec<f64>,
    active_bins: (usize, usize),
}

impl NetworkEdge {
    fn new(start: usize, end: usize, weights: Vec<f64>) -> Self {
        let last = weights.len().saturating_sub(1);
        Self {
            start,
            end,
            weights,
            active_bins: (0, last),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Stored weight per bin (a single value for band-averaged networks).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight_at(&self, bin: usize) -> Option<f64> {
        self.weights.get(bin).copied()
    }

    /// Inclusive bin range averaged by [`NetworkEdge::weight`].
    pub fn active_bins(&self) -> (usize, usize) {
        self.active_bins
    }

    /// Mean weight over the active bin range.
    pub fn weight(&self) -> f64 {
        if self.weights.is_empty() {
            return 0.0;
        }
        let last = self.weights.len() - 1;
        let lo = self.active_bins.0.min(last);
        let hi = self.active_bins.1.min(last).max(lo);
        let slice = &self.weights[lo..=hi];
        slice.iter().sum::<f64>() / slice.len() as f64
    }

    pub fn connects(&self, a: usize, b: usize) -> bool {
        (self.start == a && self.end == b) || (self.start == b && self.end == a)
    }

    /// The endpoint opposite `node`.
    pub fn other(&self, node: usize) -> usize {
        if self.start == node {
            self.end
        } else {
            self.start
        }
    }
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Undirected weighted graph produced by a connectivity metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    method: String,
    sampling_frequency: f64,
    nfft: usize,
    num_trials: usize,
    nodes: Vec<NetworkNode>,
    edges: Vec<NetworkEdge>,
    pairs: HashMap<(usize, usize), usize>,
    active_bins: Option<(usize, usize)>,
}

impl Network {
    /// Empty network tagged with the metric and the spectral parameters it
    /// was computed with.
    pub fn new(method: impl Into<String>, sampling_frequency: f64, nfft: usize, num_trials: usize) -> Self {
        Self {
            method: method.into(),
            sampling_frequency,
            nfft,
            num_trials,
            nodes: Vec::new(),
            edges: Vec::new(),
            pairs: HashMap::new(),
            active_bins: None,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    pub fn nfft(&self) -> usize {
        self.nfft
    }

    /// Number of trials averaged into the weights.
    pub fn num_trials(&self) -> usize {
        self.num_trials
    }

    pub fn nodes(&self) -> &[NetworkNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[NetworkEdge] {
        &self.edges
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Active bin range, `None` for the whole spectrum.
    pub fn active_bins(&self) -> Option<(usize, usize)> {
        self.active_bins
    }

    /// Add a node and return its id.
    pub fn add_node(&mut self, position: Option<[f64; 3]>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(NetworkNode {
            id,
            position,
            edges: Vec::new(),
        });
        id
    }

    /// Connect two existing nodes and return the new edge's index.
    pub fn add_edge(&mut self, start: usize, end: usize, weights: Vec<f64>) -> ConnResult<usize> {
        if start == end {
            return Err(ConnError::InvalidConfig(format!(
                "self-loop on node {} is not allowed",
                start
            )));
        }
        let num_nodes = self.nodes.len();
        if start >= num_nodes || end >= num_nodes {
            return Err(ConnError::InvalidConfig(format!(
                "edge {}-{} references a node outside 0..{}",
                start, end, num_nodes
            )));
        }
        let key = pair_key(start, end);
        if self.pairs.contains_key(&key) {
            return Err(ConnError::InvalidConfig(format!(
                "edge {}-{} already exists",
                start, end
            )));
        }
        if let Some(first) = self.edges.first() {
            if first.weights.len() != weights.len() {
                return Err(ConnError::InvalidConfig(format!(
                    "edge {}-{} has {} weights, network stores {}",
                    start,
                    end,
                    weights.len(),
                    first.weights.len()
                )));
            }
        }

        let index = self.edges.len();
        let mut edge = NetworkEdge::new(start, end, weights);
        if let Some(range) = self.active_bins {
            edge.active_bins = range;
        }
        self.edges.push(edge);
        self.pairs.insert(key, index);
        self.nodes[start].edges.push(index);
        self.nodes[end].edges.push(index);
        Ok(index)
    }

    /// The edge joining `a` and `b`, in either direction.
    pub fn edge_between(&self, a: usize, b: usize) -> Option<&NetworkEdge> {
        self.pairs.get(&pair_key(a, b)).map(|&i| &self.edges[i])
    }

    /// Sum of the weights of every edge incident to `node`.
    pub fn node_strength(&self, node: usize) -> f64 {
        self.nodes.get(node).map_or(0.0, |n| {
            n.edges.iter().map(|&i| self.edges[i].weight()).sum()
        })
    }

    /// Centre frequency of `bin` in Hz.
    pub fn frequency_of_bin(&self, bin: usize) -> f64 {
        if self.nfft == 0 {
            return 0.0;
        }
        bin as f64 * self.sampling_frequency / self.nfft as f64
    }

    /// Restrict edge weights to the bins inside `[low_hz, high_hz]`.
    pub fn set_frequency_range(&mut self, low_hz: f64, high_hz: f64) -> ConnResult<()> {
        let (lo, hi) = FrequencyBand::new(low_hz, high_hz).to_bins(self.sampling_frequency, self.nfft)?;
        self.set_frequency_bins(lo, hi)
    }

    /// Restrict edge weights to the inclusive bin range `lo..=hi`.
    ///
    /// `hi` is clamped to the last bin.
    pub fn set_frequency_bins(&mut self, lo: usize, hi: usize) -> ConnResult<()> {
        let last = num_freq_bins(self.nfft).saturating_sub(1);
        let hi = hi.min(last);
        if lo > hi {
            return Err(ConnError::InvalidConfig(format!(
                "bin range {}..={} is empty",
                lo, hi
            )));
        }
        self.active_bins = Some((lo, hi));
        for edge in &mut self.edges {
            edge.active_bins = (lo, hi);
        }
        Ok(())
    }

    /// Symmetric node × node matrix of edge weights, zero on the diagonal.
    pub fn full_connectivity_matrix(&self) -> RealMatrix {
        let n = self.nodes.len();
        let mut matrix = RealMatrix::new(n, n);
        for edge in &self.edges {
            let w = edge.weight();
            matrix.set(edge.start, edge.end, w);
            matrix.set(edge.end, edge.start, w);
        }
        matrix
    }

    /// Smallest and largest edge weight, `None` without edges.
    pub fn min_max_weights(&self) -> Option<(f64, f64)> {
        self.edges.iter().map(NetworkEdge::weight).fold(None, |acc, w| match acc {
            None => Some((w, w)),
            Some((lo, hi)) => Some((lo.min(w), hi.max(w))),
        })
    }

    /// Copy keeping only edges whose weight is at least `threshold`.
    pub fn thresholded(&self, threshold: f64) -> Network {
        let mut out = Network::new(self.method.clone(), self.sampling_frequency, self.nfft, self.num_trials);
        out.active_bins = self.active_bins;
        for node in &self.nodes {
            out.add_node(node.position);
        }
        for edge in self.edges.iter().filter(|e| e.weight() >= threshold) {
            let index = out.edges.len();
            out.pairs.insert(pair_key(edge.start, edge.end), index);
            out.nodes[edge.start].edges.push(index);
            out.nodes[edge.end].edges.push(index);
            out.edges.push(edge.clone());
        }
        out
    }

    /// Scale all weights so the largest edge weight becomes 1.
    pub fn normalize(&mut self) {
        let max = match self.min_max_weights() {
            Some((_, max)) if max > 0.0 => max,
            _ => return,
        };
        for edge in &mut self.edges {
            for w in &mut edge.weights {
                *w /= max;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> Network {
        let mut net = Network::new("PLI", 8.0, 8, 10);
        for _ in 0..3 {
            net.add_node(None);
        }
        net.add_edge(0, 1, vec![0.0, 0.2, 0.4, 0.6, 0.8]).unwrap();
        net.add_edge(1, 2, vec![1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        net.add_edge(0, 2, vec![0.0, 0.0, 0.0, 0.0, 0.5]).unwrap();
        net
    }

    #[test]
    fn test_metadata() {
        let net = triangle();
        assert_eq!(net.method(), "PLI");
        assert_eq!(net.nfft(), 8);
        assert_eq!(net.num_trials(), 10);
        assert_eq!(net.num_nodes(), 3);
        assert_eq!(net.num_edges(), 3);
        assert_relative_eq!(net.frequency_of_bin(3), 3.0);
    }

    #[test]
    fn test_add_edge_rejections() {
        let mut net = triangle();
        assert!(net.add_edge(1, 1, vec![0.0; 5]).is_err());
        assert!(net.add_edge(0, 7, vec![0.0; 5]).is_err());
        assert!(net.add_edge(2, 1, vec![0.0; 5]).is_err());

        net.add_node(None);
        assert!(net.add_edge(0, 3, vec![0.0; 2]).is_err());
        assert!(net.add_edge(0, 3, vec![0.0; 5]).is_ok());
    }

    #[test]
    fn test_weight_over_whole_spectrum_and_band() {
        let mut net = triangle();
        assert_relative_eq!(net.edge_between(1, 0).unwrap().weight(), 0.4, epsilon = 1e-12);

        net.set_frequency_range(3.0, 4.0).unwrap();
        assert_eq!(net.active_bins(), Some((3, 4)));
        assert_relative_eq!(net.edge_between(0, 1).unwrap().weight(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(net.edge_between(0, 2).unwrap().weight(), 0.25, epsilon = 1e-12);

        // Upper edge is clamped to the last bin
        net.set_frequency_bins(4, 100).unwrap();
        assert_relative_eq!(net.edge_between(0, 1).unwrap().weight(), 0.8, epsilon = 1e-12);
        assert!(net.set_frequency_bins(3, 2).is_err());
    }

    #[test]
    fn test_full_matrix_is_symmetric() {
        let net = triangle();
        let m = net.full_connectivity_matrix();
        for i in 0..3 {
            assert_eq!(m.get(i, i), 0.0);
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
        assert_relative_eq!(m.get(1, 2), 1.0);
    }

    #[test]
    fn test_degree_and_strength() {
        let net = triangle();
        assert_eq!(net.nodes()[1].degree(), 2);
        assert_relative_eq!(net.node_strength(1), 1.4, epsilon = 1e-12);
        assert_eq!(net.edges()[0].other(0), 1);
    }

    #[test]
    fn test_threshold_and_normalize() {
        let net = triangle();
        let (lo, hi) = net.min_max_weights().unwrap();
        assert_relative_eq!(lo, 0.1, epsilon = 1e-12);
        assert_relative_eq!(hi, 1.0, epsilon = 1e-12);

        let strong = net.thresholded(0.3);
        assert_eq!(strong.num_nodes(), 3);
        assert_eq!(strong.num_edges(), 2);
        assert!(strong.edge_between(0, 2).is_none());
        assert_eq!(strong.nodes()[2].degree(), 1);

        let mut scaled = Network::new("PLI", 8.0, 8, 1);
        scaled.add_node(None);
        scaled.add_node(None);
        scaled.add_edge(0, 1, vec![0.5, 0.5]).unwrap();
        scaled.normalize();
        assert_relative_eq!(scaled.edges()[0].weight(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_value_edges_ignore_band() {
        let mut net = Network::new("PLI", 8.0, 8, 1);
        net.add_node(None);
        net.add_node(Some([0.0, 1.0, 0.0]));
        net.add_edge(0, 1, vec![0.3]).unwrap();
        net.set_frequency_bins(2, 3).unwrap();
        assert_relative_eq!(net.edges()[0].weight(), 0.3);
        assert_eq!(net.nodes()[1].position(), Some([0.0, 1.0, 0.0]));
    }
}
