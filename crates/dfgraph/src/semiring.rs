//! Log-domain reductions used by the message passing engines.
//!
//! Both engines combine terms with `+` in log space (products of potentials)
//! and differ only in how a set of terms is reduced: log-sum-exp for
//! sum-product, max for max-sum.

/// Streaming reduction over log-domain terms.
pub(crate) trait Semiring {
    type Acc: Copy;

    /// Accumulator for an empty set (the log-domain zero).
    fn empty() -> Self::Acc;

    fn push(acc: &mut Self::Acc, term: f64);

    fn finish(acc: Self::Acc) -> f64;
}

/// `log Σ exp(xᵢ)`, evaluated online against the running maximum.
pub(crate) struct LogSumExp;

impl Semiring for LogSumExp {
    /// (running max, Σ exp(xᵢ - max))
    type Acc = (f64, f64);

    fn empty() -> Self::Acc {
        (f64::NEG_INFINITY, 0.0)
    }

    #[inline]
    fn push(acc: &mut Self::Acc, term: f64) {
        let (max, sum) = acc;
        if term == f64::NEG_INFINITY {
            return;
        }
        if term > *max {
            *sum = *sum * (*max - term).exp() + 1.0;
            *max = term;
        } else {
            *sum += (term - *max).exp();
        }
    }

    fn finish((max, sum): Self::Acc) -> f64 {
        if max == f64::NEG_INFINITY {
            f64::NEG_INFINITY
        } else {
            max + sum.ln()
        }
    }
}

/// `max xᵢ`.
pub(crate) struct MaxPlus;

impl Semiring for MaxPlus {
    type Acc = f64;

    fn empty() -> Self::Acc {
        f64::NEG_INFINITY
    }

    #[inline]
    fn push(acc: &mut Self::Acc, term: f64) {
        if term > *acc {
            *acc = term;
        }
    }

    fn finish(acc: Self::Acc) -> f64 {
        acc
    }
}

/// Reduce a sequence of terms with the given semiring.
pub(crate) fn reduce<S: Semiring>(terms: impl IntoIterator<Item = f64>) -> f64 {
    let mut acc = S::empty();
    for term in terms {
        S::push(&mut acc, term);
    }
    S::finish(acc)
}

/// `log Σ exp(xᵢ)`, `-inf` for an empty or all `-inf` input.
pub fn log_sum_exp(values: impl IntoIterator<Item = f64>) -> f64 {
    reduce::<LogSumExp>(values)
}
