//! Bagged regression trees.
//!
//! Each tree is grown on a bootstrap sample with variance-reduction splits
//! over every feature, and has its own RNG seeded from the forest seed and
//! the tree index. Trees are fitted in parallel; the result does not depend
//! on the number of threads.

use anyhow::{Result, anyhow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::Regressor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 500,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Node {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0usize;
        loop {
            match self.nodes[at] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<Tree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.is_empty() {
            return Err(anyhow!("cannot fit a forest on zero rows"));
        }
        if x.len() != y.len() {
            return Err(anyhow!("{} feature rows but {} targets", x.len(), y.len()));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err(anyhow!("feature rows must share one non-zero width"));
        }
        if self.params.n_trees == 0 {
            return Err(anyhow!("forest needs at least one tree"));
        }

        let params = self.params;
        let grown = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let sample = (0..x.len())
                    .map(|_| rng.gen_range(0..x.len()))
                    .collect::<Vec<_>>();
                let mut grower = Grower {
                    x,
                    y,
                    params: &params,
                    nodes: Vec::new(),
                    gains: vec![0.0; n_features],
                };
                grower.grow(sample, 0);
                (Tree { nodes: grower.nodes }, grower.gains)
            })
            .collect::<Vec<_>>();

        let mut importances = vec![0.0; n_features];
        let mut contributing = 0usize;
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, gains) in grown {
            let total = gains.iter().sum::<f64>();
            if total > 0.0 {
                for (acc, g) in importances.iter_mut().zip(&gains) {
                    *acc += g / total;
                }
                contributing += 1;
            }
            trees.push(tree);
        }
        if contributing > 0 {
            for v in &mut importances {
                *v /= contributing as f64;
            }
        }

        self.n_features = n_features;
        self.trees = trees;
        self.importances = importances;
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(anyhow!("forest has not been fitted"));
        }
        x.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(anyhow!(
                        "row has {} features, forest expects {}",
                        row.len(),
                        self.n_features
                    ));
                }
                let sum = self.trees.iter().map(|t| t.predict(row)).sum::<f64>();
                Ok(sum / self.trees.len() as f64)
            })
            .collect()
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    params: &'a ForestParams,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Grower<'_> {
    /// Grows the subtree for `sample` and returns its node index.
    fn grow(&mut self, sample: Vec<usize>, depth: usize) -> usize {
        let n = sample.len() as f64;
        let sum = sample.iter().map(|i| self.y[*i]).sum::<f64>();
        let sq = sample.iter().map(|i| self.y[*i] * self.y[*i]).sum::<f64>();
        let mean = sum / n;
        let sse = sq - sum * sum / n;

        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        let depth_left = self.params.max_depth.is_none_or(|max| depth < max);
        if !depth_left || sample.len() < self.params.min_samples_split || sse <= 1e-12 {
            return at;
        }
        let Some(best) = self.best_split(&sample, sum, sq) else {
            return at;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|i| self.x[*i][best.feature] <= best.threshold);
        self.gains[best.feature] += best.gain;

        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[at] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        at
    }

    fn best_split(&self, sample: &[usize], sum: f64, sq: f64) -> Option<BestSplit> {
        let n = sample.len();
        let parent_sse = sq - sum * sum / n as f64;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        let n_features = self.gains.len();
        let mut pairs = Vec::with_capacity(n);
        for feature in 0..n_features {
            pairs.clear();
            pairs.extend(sample.iter().map(|i| (self.x[*i][feature], self.y[*i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let (v, y) = pairs[pos];
                left_sum += y;
                left_sq += y * y;
                let next = pairs[pos + 1].0;
                if v == next {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let right_sum = sum - left_sum;
                let sse_left = left_sq - left_sum * left_sum / n_left as f64;
                let sse_right = (sq - left_sq) - right_sum * right_sum / n_right as f64;
                let gain = parent_sse - sse_left - sse_right;
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: v + (next - v) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::{ForestParams, RandomForest};
    use crate::model::Regressor;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let signal = i as f64;
            let noise = ((i * 7) % 5) as f64;
            x.push(vec![signal, noise]);
            y.push(if signal < 30.0 { 40.0 } else { 50.0 });
        }
        (x, y)
    }

    fn small(seed: u64) -> ForestParams {
        ForestParams {
            n_trees: 25,
            seed,
            ..ForestParams::default()
        }
    }

    #[test]
    fn learns_a_step_and_credits_the_informative_feature() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(small(42));
        forest.fit(&x, &y).unwrap();

        let pred = forest.predict(&[vec![5.0, 1.0], vec![55.0, 1.0]]).unwrap();
        assert!(pred[0] < 42.0, "low side predicted {}", pred[0]);
        assert!(pred[1] > 48.0, "high side predicted {}", pred[1]);

        let imp = forest.feature_importances();
        assert_relative_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = step_data();
        let mut a = RandomForest::new(small(7));
        let mut b = RandomForest::new(small(7));
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_width_mismatch() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(small(1));
        forest.fit(&x, &y).unwrap();
        assert!(forest.predict(&[vec![1.0]]).is_err());
        assert!(RandomForest::new(small(1)).predict(&x).is_err());
    }
}
