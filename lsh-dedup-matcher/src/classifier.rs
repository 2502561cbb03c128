use lsh_dedup_labeler::error::DedupError;

/// L2-regularised logistic regression fitted by batch gradient descent.
#[derive(Clone, Debug)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
    /// L2 penalty on the weights (not the bias)
    alpha: f64,
    learning_rate: f64,
    epochs: usize,
    fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.01, 0.5, 1000)
    }
}

impl LogisticRegression {
    pub fn new(alpha: f64, learning_rate: f64, epochs: usize) -> Self {
        Self {
            weights: Vec::new(),
            bias: 0.0,
            alpha,
            learning_rate,
            epochs,
            fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Fits on `features` with targets in {0, 1}. Refitting starts from scratch.
    pub fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), DedupError> {
        if features.is_empty() {
            return Err(DedupError::training("no examples to fit"));
        }
        if features.len() != targets.len() {
            return Err(DedupError::training(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let dim = features[0].len();
        if let Some(row) = features.iter().find(|row| row.len() != dim) {
            return Err(DedupError::training(format!(
                "inconsistent feature width: {} vs {}",
                row.len(),
                dim
            )));
        }

        let n = features.len() as f64;
        let mut weights = vec![0.0; dim];
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let mut grad_w = vec![0.0; dim];
            let mut grad_b = 0.0;
            for (row, &target) in features.iter().zip(targets) {
                let error = sigmoid(dot(&weights, row) + bias) - target;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += error * x;
                }
                grad_b += error;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / n + self.alpha * *w);
            }
            bias -= self.learning_rate * grad_b / n;
        }

        self.weights = weights;
        self.bias = bias;
        self.fitted = true;
        Ok(())
    }

    /// Probability that the pair described by `features` is a match.
    /// An unfitted model answers 0.5 for everything.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        if !self.fitted {
            return 0.5;
        }
        sigmoid(dot(&self.weights, features) + self.bias)
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
