//! CART decision tree over dense `f64` rows.
//!
//! Binary classification labels are 0.0/1.0, so the leaf value (mean label)
//! doubles as the positive-class probability. Regression leaves hold the mean
//! target. Candidate features are visited in a seeded shuffled order; the
//! first split reaching the best gain wins, so fits are reproducible.

use crate::domain::error::StockcastError;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Gini,
    Entropy,
    SquaredError,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
            Criterion::SquaredError => "squared_error",
        }
    }

    fn impurity(&self, stats: &Stats) -> f64 {
        if stats.n == 0 {
            return 0.0;
        }
        let n = stats.n as f64;
        let mean = stats.sum / n;
        match self {
            Criterion::Gini => 2.0 * mean * (1.0 - mean),
            Criterion::Entropy => {
                let entropy_term = |p: f64| if p > 0.0 { -p * p.log2() } else { 0.0 };
                entropy_term(mean) + entropy_term(1.0 - mean)
            }
            Criterion::SquaredError => (stats.sum_sq / n - mean * mean).max(0.0),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            "squared_error" | "mse" => Ok(Criterion::SquaredError),
            other => Err(format!("unknown split criterion '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl Stats {
    fn of(labels: &[f64], rows: &[usize]) -> Self {
        rows.iter().fold(Stats::default(), |mut s, &r| {
            s.push(labels[r]);
            s
        })
    }

    fn push(&mut self, y: f64) {
        self.n += 1;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn pop(&mut self, y: f64) {
        self.n -= 1;
        self.sum -= y;
        self.sum_sq -= y * y;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    n_features: usize,
    root: Node,
}

impl DecisionTree {
    /// Fits a tree on `rows` (one feature vector per sample) against `labels`.
    pub fn fit(params: TreeParams, rows: &[Vec<f64>], labels: &[f64]) -> Result<Self, StockcastError> {
        if rows.is_empty() {
            return Err(StockcastError::Model {
                reason: "cannot fit a tree on zero samples".to_string(),
            });
        }
        if rows.len() != labels.len() {
            return Err(StockcastError::Model {
                reason: format!("{} samples but {} labels", rows.len(), labels.len()),
            });
        }
        let n_features = rows[0].len();
        if let Some(bad) = rows.iter().position(|r| r.len() != n_features) {
            return Err(StockcastError::Model {
                reason: format!("sample {} has {} features, expected {}", bad, rows[bad].len(), n_features),
            });
        }
        if params.max_depth == 0 {
            return Err(StockcastError::Model {
                reason: "max_depth must be at least 1".to_string(),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let all: Vec<usize> = (0..rows.len()).collect();
        let root = grow(&params, rows, labels, &all, 0, &mut rng);

        Ok(Self {
            n_features,
            root,
        })
    }

    /// Leaf value for one sample: mean label (class-1 probability) or mean target.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, StockcastError> {
        if sample.len() != self.n_features {
            return Err(StockcastError::Model {
                reason: format!(
                    "sample has {} features, tree was fitted on {}",
                    sample.len(),
                    self.n_features
                ),
            });
        }
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return Ok(*value),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }

    pub fn leaf_count(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        walk(&self.root)
    }
}

fn grow(
    params: &TreeParams,
    rows: &[Vec<f64>],
    labels: &[f64],
    idx: &[usize],
    depth: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    let stats = Stats::of(labels, idx);
    let impurity = params.criterion.impurity(&stats);

    if depth >= params.max_depth || idx.len() < params.min_samples_split || impurity <= MIN_GAIN {
        return Node::Leaf { value: stats.mean() };
    }

    let Some(best) = best_split(params, rows, labels, idx, &stats, impurity, rng) else {
        return Node::Leaf { value: stats.mean() };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
        .iter()
        .partition(|&&r| rows[r][best.feature] <= best.threshold);

    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(grow(params, rows, labels, &left_idx, depth + 1, rng)),
        right: Box::new(grow(params, rows, labels, &right_idx, depth + 1, rng)),
    }
}

fn best_split(
    params: &TreeParams,
    rows: &[Vec<f64>],
    labels: &[f64],
    idx: &[usize],
    parent: &Stats,
    parent_impurity: f64,
    rng: &mut ChaCha8Rng,
) -> Option<BestSplit> {
    let n_features = rows[idx[0]].len();
    let mut order: Vec<usize> = (0..n_features).collect();
    order.shuffle(rng);

    let total = idx.len() as f64;
    let mut best: Option<BestSplit> = None;
    let mut sorted = idx.to_vec();

    for feature in order {
        sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left = Stats::default();
        let mut right = *parent;
        for k in 0..sorted.len() - 1 {
            let y = labels[sorted[k]];
            left.push(y);
            right.pop(y);

            let here = rows[sorted[k]][feature];
            let next = rows[sorted[k + 1]][feature];
            if here == next
                || left.n < params.min_samples_leaf
                || right.n < params.min_samples_leaf
            {
                continue;
            }

            let weighted = (left.n as f64 * params.criterion.impurity(&left)
                + right.n as f64 * params.criterion.impurity(&right))
                / total;
            let gain = parent_impurity - weighted;
            if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}
