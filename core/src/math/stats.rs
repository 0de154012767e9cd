use crate::prelude::{EnmError, EnmResult};

/// Likelihood and information-criterion arithmetic for model evaluation.
pub struct StatsHelper;

impl StatsHelper {
    /// `Σ ln(value / total)` over the sampled values.
    pub fn log_likelihood(values: &[f32], total: f64) -> f64 {
        values
            .iter()
            .map(|&value| (f64::from(value) / total).ln())
            .sum()
    }

    /// Small-sample corrected Akaike information criterion:
    ///
    /// ```text
    /// AICc = (2K - 2 ln L) + 2K(K + 1) / (n - K - 1)
    /// ```
    ///
    /// Undefined, and reported as `InsufficientSamples`, when `n - K - 1 <= 0`.
    pub fn aicc(log_likelihood: f64, n: usize, k: usize) -> EnmResult<f64> {
        if n <= k + 1 {
            return Err(EnmError::InsufficientSamples { n, k });
        }
        let k_f = k as f64;
        let correction = 2.0 * k_f * (k_f + 1.0) / (n - k - 1) as f64;
        Ok((2.0 * k_f - 2.0 * log_likelihood) + correction)
    }
}
