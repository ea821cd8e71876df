// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Isolation forest over fixed-width feature vectors.
//!
//! Each tree is an arena: node 0 is the root and every split refers to its
//! children by index. Children are always allocated after their parent, which
//! [`IsolationForest::validate`] checks for arenas loaded from disk.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{MrvError, MrvResult};
use crate::features::{FeatureVector, FEATURE_COUNT};

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: NodeId,
        right: NodeId,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
        }
    }
}

pub fn max_depth_for(subsample: usize) -> usize {
    if subsample <= 1 {
        return 0;
    }
    (subsample as f64).log2().ceil() as usize
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(
        samples: &[FeatureVector],
        indices: Vec<usize>,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(samples, indices, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        samples: &[FeatureVector],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });
        if indices.len() <= 1 || depth >= max_depth {
            return id;
        }

        let mut candidates = Vec::with_capacity(FEATURE_COUNT);
        for feature in 0..FEATURE_COUNT {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for &i in &indices {
                lo = lo.min(samples[i][feature]);
                hi = hi.max(samples[i][feature]);
            }
            if lo < hi {
                candidates.push((feature, lo, hi));
            }
        }
        // Every remaining point is identical; nothing left to isolate.
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = if (hi - lo).is_finite() {
            rng.gen_range(lo..hi)
        } else {
            lo / 2.0 + hi / 2.0
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| samples[i][feature] < threshold);

        let left = self.grow(samples, left, depth + 1, max_depth, rng);
        let right = self.grow(samples, right, depth + 1, max_depth, rng);
        self.nodes[id as usize] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    pub fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut id = 0usize;
        let mut depth = 0.0;
        // Bounded walk: a malformed arena can never loop forever.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(id) {
                Some(Node::Leaf { size }) => return depth + average_path_length(*size),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = x.get(*feature).copied().unwrap_or(0.0);
                    let next = if value < *threshold { *left } else { *right };
                    id = next as usize;
                    depth += 1.0;
                }
                None => break,
            }
        }
        depth
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn validate(&self) -> MrvResult<()> {
        if self.nodes.is_empty() {
            return Err(MrvError::InvalidConfig("isolation tree has no nodes".into()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                let in_arena = |child: NodeId| {
                    (child as usize) > idx && (child as usize) < self.nodes.len()
                };
                if *feature >= FEATURE_COUNT
                    || !threshold.is_finite()
                    || !in_arena(*left)
                    || !in_arena(*right)
                {
                    return Err(MrvError::InvalidConfig(format!(
                        "malformed split node {idx}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Effective subsample size ψ used to normalise path lengths.
    subsample_size: usize,
}

impl IsolationForest {
    pub fn fit(
        samples: &[FeatureVector],
        tree_count: usize,
        subsample_size: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let psi = subsample_size.min(samples.len());
        let max_depth = max_depth_for(psi);
        let trees = (0..tree_count)
            .map(|_| {
                let indices = rand::seq::index::sample(rng, samples.len(), psi).into_vec();
                IsolationTree::build(samples, indices, max_depth, rng)
            })
            .collect();
        Self {
            trees,
            subsample_size: psi,
        }
    }

    /// `2^(-E[h(x)] / c(ψ))`: near 1 for short isolation paths, near 0 for long.
    pub fn score(&self, x: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let norm = average_path_length(self.subsample_size);
        if norm <= 0.0 {
            return 0.0;
        }
        2f64.powf(-mean_path / norm).clamp(0.0, 1.0)
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }

    pub fn validate(&self) -> MrvResult<()> {
        if self.trees.is_empty() {
            return Err(MrvError::InvalidConfig("forest has no trees".into()));
        }
        if self.subsample_size < 2 {
            return Err(MrvError::InvalidConfig(format!(
                "forest subsample_size={} below 2",
                self.subsample_size
            )));
        }
        self.trees.iter().try_for_each(IsolationTree::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn cluster(n: usize, seed: u64) -> Vec<FeatureVector> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                [
                    rng.gen_range(90.0..110.0),
                    rng.gen_range(0.0..24.0),
                    rng.gen_range(-5.0..5.0),
                ]
            })
            .collect()
    }

    #[test]
    fn average_path_length_reference_values() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244_770_920_8).abs() < 1e-6, "c(256)={c256}");
    }

    #[test]
    fn depth_bound_is_ceil_log2() {
        assert_eq!(max_depth_for(256), 8);
        assert_eq!(max_depth_for(10), 4);
        assert_eq!(max_depth_for(2), 1);
    }

    #[test]
    fn arena_children_follow_parents_and_respect_depth() {
        let data = cluster(300, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let forest = IsolationForest::fit(&data, 10, 64, &mut rng);
        assert_eq!(forest.trees().len(), 10);
        assert_eq!(forest.subsample_size(), 64);
        forest.validate().expect("valid arena");
        for tree in forest.trees() {
            let leaves: usize = tree
                .nodes()
                .iter()
                .filter_map(|n| match n {
                    Node::Leaf { size } => Some(*size),
                    Node::Split { .. } => None,
                })
                .sum();
            assert_eq!(leaves, 64);
            assert!(tree.path_length(&data[0]) <= 6.0 + average_path_length(64));
        }
    }

    #[test]
    fn outlier_isolates_faster_than_inlier() {
        let data = cluster(512, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let forest = IsolationForest::fit(&data, 100, 256, &mut rng);
        let inlier = forest.score(&[100.0, 12.0, 0.0]);
        let outlier = forest.score(&[1_000.0, 12.0, 900.0]);
        assert!(outlier > inlier, "outlier={outlier} inlier={inlier}");
        assert!((0.0..=1.0).contains(&inlier));
        assert!((0.0..=1.0).contains(&outlier));
    }

    #[test]
    fn constant_data_yields_single_leaf_trees() {
        let data = vec![[5.0, 5.0, 5.0]; 20];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let forest = IsolationForest::fit(&data, 4, 16, &mut rng);
        for tree in forest.trees() {
            assert_eq!(tree.nodes(), &[Node::Leaf { size: 16 }]);
        }
    }

    #[test]
    fn validate_rejects_backward_child_links() {
        let forest = IsolationForest {
            trees: vec![IsolationTree {
                nodes: vec![Node::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 0,
                }],
            }],
            subsample_size: 16,
        };
        assert!(forest.validate().is_err());
    }
}
