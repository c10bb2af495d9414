use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{BoxedPredictor, Predictor, PredictorKind, downcast_mut};
use crate::{RestoreError, params::RlsParams};

/// Basis the RLS model is linear in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Features {
    /// `[offset, x_0, ..., x_{d-1}]`
    Linear,
    /// Linear terms followed by `x_i x_j` for every `i <= j`.
    Quadratic,
}

impl Features {
    /// Length of the extended input for a `d`-dimensional prediction input.
    #[must_use]
    pub fn len(self, d: usize) -> usize {
        match self {
            Self::Linear => 1 + d,
            Self::Quadratic => 1 + d + d * (d + 1) / 2,
        }
    }

    fn expand(self, input: &[f64], offset: f64, out: &mut Vec<f64>) {
        out.clear();
        out.push(offset);
        out.extend_from_slice(input);
        if self == Self::Quadratic {
            for (i, xi) in input.iter().enumerate() {
                out.extend(input[i..].iter().map(|xj| xi * xj));
            }
        }
    }
}

/// Recursive least squares model, one coefficient row per output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlsPredictor {
    features: Features,
    input_len: usize,
    coefficients: Vec<Vec<f64>>,
    /// Row-major square matrix over the extended input.
    gain: Vec<f64>,
    params: RlsParams,
    #[serde(skip)]
    extended: Vec<f64>,
    #[serde(skip)]
    gain_vector: Vec<f64>,
    #[serde(skip)]
    projected: Vec<f64>,
}

impl RlsPredictor {
    #[must_use]
    pub fn new(
        features: Features,
        input_len: usize,
        initial_output: &[f64],
        params: RlsParams,
    ) -> Self {
        let n = features.len(input_len);
        let coefficients = initial_output
            .iter()
            .map(|&initial| {
                let mut row = vec![0.0; n];
                if params.offset_value > 0.0 {
                    row[0] = initial / params.offset_value;
                }
                row
            })
            .collect();
        Self {
            features,
            input_len,
            coefficients,
            gain: initial_gain(n, params.init_scale),
            params,
            extended: Vec::with_capacity(n),
            gain_vector: vec![0.0; n],
            projected: vec![0.0; n],
        }
    }

    pub(super) fn from_payload(payload: &str) -> Result<Self, RestoreError> {
        let mut predictor: Self =
            serde_json::from_str(payload).map_err(RestoreError::Payload)?;
        let n = predictor.features.len(predictor.input_len);
        if predictor.gain.len() != n * n || predictor.coefficients.iter().any(|row| row.len() != n)
        {
            return Err(RestoreError::Shape(format!(
                "RLS model over {} inputs needs {n} coefficients per output and {n}x{n} gain",
                predictor.input_len
            )));
        }
        predictor.gain_vector = vec![0.0; n];
        predictor.projected = vec![0.0; n];
        Ok(predictor)
    }

    #[must_use]
    pub fn features(&self) -> Features {
        self.features
    }

    #[must_use]
    pub fn coefficients(&self) -> &[Vec<f64>] {
        &self.coefficients
    }

    fn extended_len(&self) -> usize {
        self.features.len(self.input_len)
    }
}

fn initial_gain(n: usize, init_scale: f64) -> Vec<f64> {
    let mut gain = vec![0.0; n * n];
    for i in 0..n {
        gain[i * n + i] = init_scale;
    }
    gain
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Predictor for RlsPredictor {
    fn kind(&self) -> PredictorKind {
        match self.features {
            Features::Linear => PredictorKind::LinearRls,
            Features::Quadratic => PredictorKind::QuadraticRls,
        }
    }

    fn predict(&self, input: &[f64]) -> Vec<f64> {
        let mut extended = Vec::with_capacity(self.extended_len());
        self.features
            .expand(input, self.params.offset_value, &mut extended);
        self.coefficients
            .iter()
            .map(|row| dot(row, &extended))
            .collect()
    }

    fn update(&mut self, input: &[f64], target: &[f64]) {
        let n = self.extended_len();
        self.features
            .expand(input, self.params.offset_value, &mut self.extended);
        self.gain_vector.resize(n, 0.0);
        self.projected.resize(n, 0.0);
        let x = &self.extended;

        // k = G x / (λ + xᵀ G x)
        for (i, k) in self.gain_vector.iter_mut().enumerate() {
            *k = dot(&self.gain[i * n..(i + 1) * n], x);
        }
        let divisor = self.params.lambda + dot(x, &self.gain_vector);
        if !divisor.is_finite() || divisor.abs() < f64::EPSILON {
            log::trace!("skipping RLS update with degenerate divisor {divisor}");
            return;
        }
        for k in &mut self.gain_vector {
            *k /= divisor;
        }

        for (row, t) in self.coefficients.iter_mut().zip(target) {
            let error = t - dot(row, x);
            for (c, k) in row.iter_mut().zip(&self.gain_vector) {
                *c += error * k;
            }
        }

        // G = (I - k xᵀ) G / λ
        for (col, p) in self.projected.iter_mut().enumerate() {
            *p = (0..n).map(|j| x[j] * self.gain[j * n + col]).sum();
        }
        for i in 0..n {
            for col in 0..n {
                let g = &mut self.gain[i * n + col];
                *g = (*g - self.gain_vector[i] * self.projected[col]) / self.params.lambda;
            }
        }
    }

    fn crossover(&mut self, other: &mut dyn Predictor) {
        let other = downcast_mut::<Self>(other);
        for (a, b) in self.coefficients.iter_mut().zip(&mut other.coefficients) {
            for (x, y) in a.iter_mut().zip(b) {
                let mean = (*x + *y) / 2.0;
                *x = mean;
                *y = mean;
            }
        }
    }

    fn reproduce(&self) -> BoxedPredictor {
        let mut child = self.clone();
        child.gain = initial_gain(self.extended_len(), self.params.init_scale);
        Box::new(child)
    }

    fn reset_gain(&mut self) {
        let n = self.extended_len();
        for i in 0..n {
            self.gain[i * n + i] += self.params.init_scale;
        }
    }

    fn clone_boxed(&self) -> BoxedPredictor {
        Box::new(self.clone())
    }

    fn payload(&self) -> String {
        serde_json::to_string(self).expect("predictor parameters are plain numbers")
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
