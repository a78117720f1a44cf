//! Character-based token estimates
//!
//! These figures are approximations for display purposes and never reflect
//! what an upstream bills.

use crate::types::{CompletionRequest, CompletionResponse, Usage};

/// Average characters per token for most BPE vocabularies
pub const DEFAULT_TOKEN_WIDTH: f64 = 4.0;

/// Estimate the token count of `text` as `ceil(chars / width)`
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn estimate_tokens(text: &str, width: f64) -> u32 {
    if text.is_empty() || width <= 0.0 {
        return 0;
    }

    let chars = text.chars().count() as f64;
    (chars / width).ceil().min(f64::from(u32::MAX)) as u32
}

/// Estimated usage for a request and the completion text it produced
pub fn estimate_usage(request: &CompletionRequest, completion: &str, width: f64) -> Usage {
    Usage::estimate(
        estimate_tokens(&request.prompt_text(), width),
        estimate_tokens(completion, width),
    )
}

/// Fill in usage when the upstream omitted it
pub(crate) fn ensure_usage(response: &mut CompletionResponse, request: &CompletionRequest, width: f64) {
    if response.usage.is_none() {
        let completion = response.completion_text();
        response.usage = Some(estimate_usage(request, &completion, width));
    }
}
