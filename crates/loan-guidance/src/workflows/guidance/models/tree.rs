//! Second-order regression trees grown level by level.

use std::collections::VecDeque;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `row[feature] < threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Arena-allocated tree; node 0 is the root and children always follow their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    index = if value < *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => break,
            }
        }
        0.0
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Structural check run before a deserialized tree is trusted for prediction.
    pub fn is_well_formed(&self, width: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(index, node)| match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < width
                        && threshold.is_finite()
                        && *left > index
                        && *right > index
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
                TreeNode::Leaf { value } => value.is_finite(),
            })
    }
}

/// Regularization and shape limits applied while growing one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthParams {
    pub max_depth: usize,
    /// 0 means unbounded.
    pub max_leaves: usize,
    pub min_child_weight: f64,
    pub gamma: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub learning_rate: f64,
}

impl GrowthParams {
    fn thresholded(&self, grad: f64) -> f64 {
        if grad > self.reg_alpha {
            grad - self.reg_alpha
        } else if grad < -self.reg_alpha {
            grad + self.reg_alpha
        } else {
            0.0
        }
    }

    fn score(&self, grad: f64, hess: f64) -> f64 {
        let t = self.thresholded(grad);
        t * t / (hess + self.reg_lambda)
    }

    fn leaf_weight(&self, grad: f64, hess: f64) -> f64 {
        let denominator = hess + self.reg_lambda;
        if denominator <= 0.0 {
            return 0.0;
        }
        -self.thresholded(grad) / denominator * self.learning_rate
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Training view shared by every node of one tree.
pub(crate) struct GrowthInput<'a> {
    pub rows: &'a [Vec<f64>],
    pub gradients: &'a [f64],
    pub hessians: &'a [f64],
    pub columns: &'a [usize],
}

pub(crate) fn grow(input: &GrowthInput<'_>, sample: Vec<usize>, params: &GrowthParams) -> RegressionTree {
    let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
    let mut queue = VecDeque::from([(0usize, sample, 0usize)]);
    let mut leaves = 1usize;

    while let Some((id, members, depth)) = queue.pop_front() {
        let grad_sum: f64 = members.iter().map(|row| input.gradients[*row]).sum();
        let hess_sum: f64 = members.iter().map(|row| input.hessians[*row]).sum();

        let budget_left = params.max_leaves == 0 || leaves < params.max_leaves;
        if depth < params.max_depth && budget_left {
            if let Some(split) = best_split(input, &members, grad_sum, hess_sum, params) {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = members
                    .iter()
                    .partition(|row| input.rows[**row][split.feature] < split.threshold);

                let left = nodes.len();
                let right = left + 1;
                nodes.push(TreeNode::Leaf { value: 0.0 });
                nodes.push(TreeNode::Leaf { value: 0.0 });
                nodes[id] = TreeNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
                leaves += 1;
                queue.push_back((left, left_rows, depth + 1));
                queue.push_back((right, right_rows, depth + 1));
                continue;
            }
        }

        nodes[id] = TreeNode::Leaf {
            value: params.leaf_weight(grad_sum, hess_sum),
        };
    }

    RegressionTree { nodes }
}

fn best_split(
    input: &GrowthInput<'_>,
    members: &[usize],
    grad_sum: f64,
    hess_sum: f64,
    params: &GrowthParams,
) -> Option<SplitCandidate> {
    let parent = params.score(grad_sum, hess_sum);

    let candidates: Vec<SplitCandidate> = input
        .columns
        .par_iter()
        .filter_map(|feature| {
            best_split_on(input, *feature, members, grad_sum, hess_sum, parent, params)
        })
        .collect();

    // Highest gain wins; equal gains resolve to the lowest feature index.
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(current)
            if current.gain > candidate.gain
                || (current.gain == candidate.gain && current.feature < candidate.feature) =>
        {
            Some(current)
        }
        _ => Some(candidate),
    })
}

fn best_split_on(
    input: &GrowthInput<'_>,
    feature: usize,
    members: &[usize],
    grad_sum: f64,
    hess_sum: f64,
    parent: f64,
    params: &GrowthParams,
) -> Option<SplitCandidate> {
    let mut ordered: Vec<(f64, usize)> = members
        .iter()
        .map(|row| (input.rows[*row][feature], *row))
        .collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut grad_left = 0.0;
    let mut hess_left = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for index in 0..ordered.len().saturating_sub(1) {
        let (value, row) = ordered[index];
        grad_left += input.gradients[row];
        hess_left += input.hessians[row];

        let next = ordered[index + 1].0;
        if next <= value {
            continue;
        }

        let grad_right = grad_sum - grad_left;
        let hess_right = hess_sum - hess_left;
        if hess_left < params.min_child_weight || hess_right < params.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (params.score(grad_left, hess_left) + params.score(grad_right, hess_right) - parent)
            - params.gamma;
        if gain <= 0.0 || best.map_or(false, |current| current.gain >= gain) {
            continue;
        }

        let midpoint = value + (next - value) / 2.0;
        let threshold = if midpoint > value { midpoint } else { next };
        best = Some(SplitCandidate {
            feature,
            threshold,
            gain,
        });
    }

    best
}
