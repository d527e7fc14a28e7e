//! Weighted CART regression tree
//!
//! Splits minimize the weighted sum of squared errors. With 0/1 targets this
//! is half the weighted Gini impurity, so the same tree serves as the
//! classification tree inside the forest and as the residual learner inside
//! gradient boosting.

use crate::error::{Result, StressError};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split; `None` examines all of them
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Training data view shared by every node of one tree
pub struct TreeData<'a> {
    pub rows: &'a [Vec<f64>],
    pub targets: &'a [f64],
    pub weights: &'a [f64],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `samples` (duplicates allowed).
    ///
    /// Weighted impurity decrease per split is added to `importances`.
    pub fn fit(
        data: &TreeData<'_>,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> Self {
        let n_features = data.rows.first().map_or(0, Vec::len);
        let mut builder = Builder {
            data,
            params,
            rng,
            importances,
            n_features,
            nodes: Vec::new(),
        };
        builder.grow(samples, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        match self.nodes[self.leaf_index(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => unreachable!("leaf_index always stops at a leaf"),
        }
    }

    /// Index of the leaf `row` falls into
    pub fn leaf_index(&self, row: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Overwrite a leaf value (Newton step in boosting)
    pub fn set_leaf_value(&mut self, idx: usize, new_value: f64) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(idx) {
            *value = new_value;
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Structural checks for a tree read back from an artifact.
    ///
    /// Children always sit after their parent, so a valid tree has no cycles
    /// and every walk from the root ends at a leaf.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(StressError::ArtifactMismatch("tree has no nodes".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(StressError::ArtifactMismatch(format!(
                        "tree node {idx} has a non-finite leaf value"
                    )));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(StressError::ArtifactMismatch(format!(
                            "tree node {idx} splits on feature {feature}, model has {n_features}"
                        )));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(StressError::ArtifactMismatch(format!(
                                "tree node {idx} points to invalid child {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

struct Builder<'a, 'd> {
    data: &'a TreeData<'d>,
    params: &'a TreeParams,
    rng: &'a mut StdRng,
    importances: &'a mut [f64],
    n_features: usize,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Running weighted sums for the squared-error criterion
#[derive(Default, Clone, Copy)]
struct Moments {
    w: f64,
    wy: f64,
    wyy: f64,
    count: usize,
}

impl Moments {
    fn add(&mut self, y: f64, w: f64) {
        self.w += w;
        self.wy += w * y;
        self.wyy += w * y * y;
        self.count += 1;
    }

    fn sub(&self, other: &Moments) -> Moments {
        Moments {
            w: self.w - other.w,
            wy: self.wy - other.wy,
            wyy: self.wyy - other.wyy,
            count: self.count - other.count,
        }
    }

    fn sse(&self) -> f64 {
        if self.w <= 0.0 {
            return 0.0;
        }
        (self.wyy - self.wy * self.wy / self.w).max(0.0)
    }

    fn mean(&self) -> f64 {
        if self.w > 0.0 {
            self.wy / self.w
        } else {
            0.0
        }
    }
}

impl Builder<'_, '_> {
    fn moments(&self, samples: &[usize]) -> Moments {
        let mut m = Moments::default();
        for &i in samples {
            m.add(self.data.targets[i], self.data.weights[i]);
        }
        m
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let total = self.moments(&samples);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: total.mean(),
        });

        if depth >= self.params.max_depth
            || samples.len() < self.params.min_samples_split
            || samples.len() < 2 * self.params.min_samples_leaf
            || total.sse() <= 1e-12 * total.w.max(1.0)
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples, &total) else {
            return idx;
        };

        self.importances[split.feature] += split.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.data.rows[i][split.feature] <= split.threshold);

        let left_idx = self.grow(left, depth + 1);
        let right_idx = self.grow(right, depth + 1);

        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_idx,
            right: right_idx,
        };
        idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = rand::seq::index::sample(&mut *self.rng, self.n_features, k.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(&mut self, samples: &[usize], total: &Moments) -> Option<BestSplit> {
        let parent_sse = total.sse();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        for feature in self.candidate_features() {
            let mut order: Vec<(f64, usize)> = samples
                .iter()
                .map(|&i| (self.data.rows[i][feature], i))
                .collect();
            order.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = Moments::default();
            for pos in 0..order.len().saturating_sub(1) {
                let (value, i) = order[pos];
                left.add(self.data.targets[i], self.data.weights[i]);

                let next = order[pos + 1].0;
                if next <= value {
                    continue;
                }
                let right = total.sub(&left);
                if left.count < min_leaf || right.count < min_leaf {
                    continue;
                }

                let gain = parent_sse - left.sse() - right.sse();
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }
}
