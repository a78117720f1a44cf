//! Per-provider sampling parameter limits

use std::ops::RangeInclusive;

use crate::error::ProviderError;
use crate::types::CompletionRequest;

/// Accepted ranges for sampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLimits {
    pub temperature: RangeInclusive<f64>,
    pub top_p: RangeInclusive<f64>,
    /// Applies to both frequency and presence penalties
    pub penalty: RangeInclusive<f64>,
    pub max_stop_sequences: usize,
}

impl ParameterLimits {
    pub const OPENAI: Self = Self {
        temperature: 0.0..=2.0,
        top_p: 0.0..=1.0,
        penalty: -2.0..=2.0,
        max_stop_sequences: 4,
    };

    pub const ANTHROPIC: Self = Self {
        temperature: 0.0..=1.0,
        top_p: 0.0..=1.0,
        penalty: -2.0..=2.0,
        max_stop_sequences: 16,
    };

    pub const GOOGLE: Self = Self {
        temperature: 0.0..=2.0,
        top_p: 0.0..=1.0,
        penalty: -2.0..=2.0,
        max_stop_sequences: 5,
    };

    /// Reject requests whose parameters fall outside these limits
    ///
    /// # Errors
    ///
    /// Returns a `validation` error naming the first offending parameter
    pub fn check(&self, request: &CompletionRequest) -> Result<(), ProviderError> {
        if request.messages.is_empty() {
            return Err(ProviderError::validation("messages must not be empty"));
        }

        let params = &request.params;

        check_range("temperature", params.temperature, &self.temperature)?;
        check_range("top_p", params.top_p, &self.top_p)?;
        check_range("frequency_penalty", params.frequency_penalty, &self.penalty)?;
        check_range("presence_penalty", params.presence_penalty, &self.penalty)?;

        if params.top_k == Some(0) {
            return Err(ProviderError::validation("top_k must be at least 1"));
        }

        if params.max_tokens == Some(0) {
            return Err(ProviderError::validation("max_tokens must be at least 1"));
        }

        if let Some(stop) = &params.stop {
            if stop.len() > self.max_stop_sequences {
                return Err(ProviderError::validation(format!(
                    "at most {} stop sequences are supported, got {}",
                    self.max_stop_sequences,
                    stop.len()
                )));
            }

            if stop.iter().any(String::is_empty) {
                return Err(ProviderError::validation("stop sequences must not be empty"));
            }
        }

        Ok(())
    }
}

fn check_range(name: &str, value: Option<f64>, range: &RangeInclusive<f64>) -> Result<(), ProviderError> {
    match value {
        Some(v) if !range.contains(&v) => Err(ProviderError::validation(format!(
            "{name} must be between {} and {}, got {v}",
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}
