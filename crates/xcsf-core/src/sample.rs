use std::fmt;

/// One observation of the target function.
///
/// A sample carries the input used for matching, the input used for prediction, and
/// the observed output. Most problems use the same vector for matching and
/// prediction; in that case predictors receive the input relative to the matching
/// region's center (see [`Classifier::predict`](crate::classifier::Classifier::predict)).
///
/// # Example
///
/// ```
/// use xcsf_core::Sample;
///
/// let sample = Sample::new(vec![0.25, 0.5], vec![1.0]);
/// assert!(sample.shares_input());
/// assert_eq!(sample.predict_input(), &[0.25, 0.5]);
///
/// let split = Sample::with_prediction_input(vec![0.25], vec![3.0, 4.0], vec![1.0]);
/// assert!(!split.shares_input());
/// assert_eq!(split.predict_input(), &[3.0, 4.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    match_input: Vec<f64>,
    predict_input: Option<Vec<f64>>,
    output: Vec<f64>,
}

impl Sample {
    /// Creates a sample whose prediction input is its matching input.
    #[must_use]
    pub fn new(input: Vec<f64>, output: Vec<f64>) -> Self {
        Self {
            match_input: input,
            predict_input: None,
            output,
        }
    }

    /// Creates a sample with separate matching and prediction inputs.
    #[must_use]
    pub fn with_prediction_input(
        match_input: Vec<f64>,
        predict_input: Vec<f64>,
        output: Vec<f64>,
    ) -> Self {
        Self {
            match_input,
            predict_input: Some(predict_input),
            output,
        }
    }

    #[must_use]
    pub fn match_input(&self) -> &[f64] {
        &self.match_input
    }

    /// Returns the prediction input, which is the matching input unless a separate one
    /// was given.
    #[must_use]
    pub fn predict_input(&self) -> &[f64] {
        self.predict_input.as_deref().unwrap_or(&self.match_input)
    }

    #[must_use]
    pub fn output(&self) -> &[f64] {
        &self.output
    }

    /// Returns `true` if matching and prediction use the same input vector.
    #[must_use]
    pub fn shares_input(&self) -> bool {
        self.predict_input.is_none()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predict_input {
            None => write!(f, "input={:?}, output={:?}", self.match_input, self.output),
            Some(predict_input) => write!(
                f,
                "match_input={:?}, predict_input={:?}, output={:?}",
                self.match_input, predict_input, self.output
            ),
        }
    }
}
