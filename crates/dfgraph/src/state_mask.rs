//! Per-variable evidence.
//!
//! A [`StateMask`] restricts the states a variable may take during one query.
//! Masks are created per call and never stored in the model.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::{PgmError, Result};

/// Evidence for a single variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateMask {
    /// Every state of the variable is allowed.
    #[default]
    Unobserved,
    /// The variable is clamped to one state.
    Observed(usize),
}

impl StateMask {
    /// Mask for an optional observation (`None` = unobserved).
    pub fn from_observation(observation: Option<usize>) -> Self {
        match observation {
            Some(state) => Self::Observed(state),
            None => Self::Unobserved,
        }
    }

    /// Whether `state` is in the mask's support.
    #[inline]
    pub fn allows(&self, state: usize) -> bool {
        match *self {
            Self::Unobserved => true,
            Self::Observed(observed) => observed == state,
        }
    }

    /// Log-space indicator: `0` on the support, `-inf` elsewhere.
    #[inline]
    pub fn log_weight(&self, state: usize) -> f64 {
        if self.allows(state) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }

    /// The observed state, if any.
    pub fn observed(&self) -> Option<usize> {
        match *self {
            Self::Unobserved => None,
            Self::Observed(state) => Some(state),
        }
    }

    /// Number of states in the support of a variable with `cardinality` states.
    pub fn support_size(&self, cardinality: usize) -> usize {
        match *self {
            Self::Unobserved => cardinality,
            Self::Observed(_) => 1,
        }
    }
}

/// Build masks from an observed-state vector and an is-observed flag vector.
///
/// Empty flags mean no evidence, whatever `observations` holds. Otherwise
/// there is one flag per variable, and `observations` must have one entry
/// per variable as soon as any flag is set.
pub fn masks_from_observations(
    num_variables: usize,
    observations: &[usize],
    observed: &[bool],
) -> Result<Vec<StateMask>> {
    if observed.is_empty() {
        return Ok(vec![StateMask::Unobserved; num_variables]);
    }
    if observed.len() != num_variables {
        return Err(PgmError::EvidenceLength {
            expected: num_variables,
            got: observed.len(),
        });
    }
    if !observed.iter().any(|&flag| flag) {
        return Ok(vec![StateMask::Unobserved; num_variables]);
    }
    if observations.len() != num_variables {
        return Err(PgmError::EvidenceLength {
            expected: num_variables,
            got: observations.len(),
        });
    }

    Ok(observations
        .iter()
        .zip(observed)
        .map(|(&state, &is_observed)| {
            if is_observed {
                StateMask::Observed(state)
            } else {
                StateMask::Unobserved
            }
        })
        .collect())
}

/// Build masks from one dataset row, where `None` marks a missing value.
pub fn masks_from_record(record: &[Option<usize>]) -> Vec<StateMask> {
    record.iter().copied().map(StateMask::from_observation).collect()
}

/// Validate masks against the variable cardinalities.
///
/// An empty slice stands for "no evidence" and expands to all-unobserved.
pub(crate) fn resolve_masks<'a>(
    cardinalities: &[usize],
    masks: &'a [StateMask],
) -> Result<Cow<'a, [StateMask]>> {
    if masks.is_empty() {
        return Ok(Cow::Owned(vec![StateMask::Unobserved; cardinalities.len()]));
    }
    if masks.len() != cardinalities.len() {
        return Err(PgmError::EvidenceLength {
            expected: cardinalities.len(),
            got: masks.len(),
        });
    }
    for (variable, (mask, &cardinality)) in masks.iter().zip(cardinalities).enumerate() {
        if let StateMask::Observed(state) = *mask {
            if state >= cardinality {
                return Err(PgmError::StateOutOfRange {
                    variable,
                    state,
                    cardinality,
                });
            }
        }
    }
    Ok(Cow::Borrowed(masks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_support() {
        let open = StateMask::Unobserved;
        assert!(open.allows(0) && open.allows(7));
        assert_eq!(open.support_size(3), 3);
        assert_eq!(open.observed(), None);

        let clamped = StateMask::Observed(1);
        assert!(clamped.allows(1));
        assert!(!clamped.allows(0));
        assert_eq!(clamped.support_size(3), 1);
        assert_eq!(clamped.log_weight(0), f64::NEG_INFINITY);
        assert_eq!(clamped.log_weight(1), 0.0);
    }

    #[test]
    fn test_masks_from_observations() {
        let masks = masks_from_observations(3, &[1, 0, 2], &[true, false, true]).unwrap();
        assert_eq!(
            masks,
            vec![
                StateMask::Observed(1),
                StateMask::Unobserved,
                StateMask::Observed(2)
            ]
        );

        let none = masks_from_observations(2, &[], &[]).unwrap();
        assert_eq!(none, vec![StateMask::Unobserved; 2]);
    }

    #[test]
    fn test_masks_from_observations_length_mismatch() {
        let err = masks_from_observations(3, &[1, 0], &[true, false]).unwrap_err();
        assert_eq!(
            err,
            PgmError::EvidenceLength {
                expected: 3,
                got: 2
            }
        );

        // Observations without flags for every variable
        assert!(masks_from_observations(2, &[0, 1], &[true]).is_err());
        assert!(masks_from_observations(2, &[], &[true, false]).is_err());
    }

    #[test]
    fn test_masks_from_observations_one_sided() {
        // No flags: the observed states are ignored
        let ignored = masks_from_observations(3, &[1, 0, 2], &[]).unwrap();
        assert_eq!(ignored, vec![StateMask::Unobserved; 3]);

        // All flags false: no states are needed
        let unflagged = masks_from_observations(2, &[], &[false, false]).unwrap();
        assert_eq!(unflagged, vec![StateMask::Unobserved; 2]);
    }

    #[test]
    fn test_masks_from_record() {
        let masks = masks_from_record(&[None, Some(2)]);
        assert_eq!(masks, vec![StateMask::Unobserved, StateMask::Observed(2)]);
    }

    #[test]
    fn test_resolve_masks() {
        let cards = [2, 3];
        assert_eq!(resolve_masks(&cards, &[]).unwrap().len(), 2);

        let masks = [StateMask::Unobserved, StateMask::Observed(2)];
        assert!(resolve_masks(&cards, &masks).is_ok());

        let out_of_range = [StateMask::Observed(2), StateMask::Unobserved];
        assert!(matches!(
            resolve_masks(&cards, &out_of_range),
            Err(PgmError::StateOutOfRange { variable: 0, .. })
        ));

        let short = [StateMask::Unobserved];
        assert!(matches!(
            resolve_masks(&cards, &short),
            Err(PgmError::EvidenceLength { .. })
        ));
    }
}
