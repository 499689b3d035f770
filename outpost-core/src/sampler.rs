//! Sampling decisions for events and transactions.

use rand::random;

use crate::performance::TransactionContext;
use crate::ClientOptions;

/// The data a `traces_sampler` callback decides on.
#[derive(Debug, Clone, Copy)]
pub struct SamplingContext<'a> {
    /// The context of the transaction being started.
    pub transaction_context: &'a TransactionContext,
}

/// Returns a random boolean with a probability defined by `rate`.
///
/// Rates at or above `1.0` always send and rates at or below `0.0` never do.
pub fn sample_should_send(rate: f32) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        random::<f32>() < rate
    }
}

/// Computes the sample rate of a new transaction.
///
/// An inherited decision wins over the `traces_sampler`, which in turn wins
/// over the static `traces_sample_rate`.
pub(crate) fn transaction_sample_rate(options: &ClientOptions, ctx: &TransactionContext) -> f32 {
    match (ctx.sampled(), options.traces_sampler.as_ref()) {
        (Some(sampled), _) => {
            if sampled {
                1.0
            } else {
                0.0
            }
        }
        (None, Some(sampler)) => sampler(&SamplingContext {
            transaction_context: ctx,
        }),
        (None, None) => options.traces_sample_rate,
    }
}
