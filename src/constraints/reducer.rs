//! Reduction of one constraint kind to a set of acceptable values.
//!
//! Requirements are processed first, then preferences. Each constraint of
//! the target kind (or each alternatives wrapper with members of that kind)
//! narrows the running set. A requirement that empties the set is a
//! conflict; a preference that would empty it is ignored.

use std::collections::BTreeSet;

use super::constraint::{ConstraintKind, InvocationConstraint, InvocationConstraints};
use crate::core::UnsupportedConstraintError;

/// How two alternative sets combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Plain set intersection.
    Intersect,
    /// Largest acceptable value of each constraint, smallest across
    /// constraints. Never conflicts.
    MaxWins,
}

/// Reduces the constraints of one [`ConstraintKind`].
#[derive(Debug, Clone, Copy)]
pub struct ConstraintReducer {
    kind: ConstraintKind,
    reduction: Reduction,
}

impl ConstraintReducer {
    /// Reducer that intersects alternatives.
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            reduction: Reduction::Intersect,
        }
    }

    /// Reducer for "maximum wins" kinds such as packet size and deadlines.
    pub fn max_wins(kind: ConstraintKind) -> Self {
        Self {
            kind,
            reduction: Reduction::MaxWins,
        }
    }

    /// Kind this reducer handles.
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// Reduce `constraints` to the acceptable alternatives of this kind.
    ///
    /// Returns an empty set when no constraint of this kind is present.
    pub fn reduce(
        &self,
        constraints: &InvocationConstraints,
    ) -> Result<BTreeSet<InvocationConstraint>, UnsupportedConstraintError> {
        let mut reduced: Option<BTreeSet<InvocationConstraint>> = None;

        for c in constraints.requirements() {
            let Some(alts) = self.relevant(c) else {
                continue;
            };
            let next = self.combine(reduced.as_ref(), &alts);
            if next.is_empty() {
                let mut offending: Vec<_> = reduced.into_iter().flatten().collect();
                offending.push(c.clone());
                return Err(UnsupportedConstraintError::new(
                    format!("conflicting {:?} requirements", self.kind),
                    offending,
                ));
            }
            reduced = Some(next);
        }

        for c in constraints.preferences() {
            let Some(alts) = self.relevant(c) else {
                continue;
            };
            let next = self.combine(reduced.as_ref(), &alts);
            if !next.is_empty() {
                reduced = Some(next);
            }
        }

        Ok(reduced.unwrap_or_default())
    }

    /// Alternatives of this kind expressed by `c`, if any.
    ///
    /// Members of other kinds inside an alternatives wrapper are ignored;
    /// they are assumed satisfiable elsewhere.
    fn relevant(&self, c: &InvocationConstraint) -> Option<BTreeSet<InvocationConstraint>> {
        if c.kind() == self.kind {
            return Some(BTreeSet::from([c.clone()]));
        }
        if let InvocationConstraint::Alternatives(alts) = c {
            let matching: BTreeSet<_> = alts
                .iter()
                .filter(|a| a.kind() == self.kind)
                .cloned()
                .collect();
            if !matching.is_empty() {
                return Some(matching);
            }
        }
        None
    }

    fn combine(
        &self,
        reduced: Option<&BTreeSet<InvocationConstraint>>,
        to_reduce: &BTreeSet<InvocationConstraint>,
    ) -> BTreeSet<InvocationConstraint> {
        match self.reduction {
            Reduction::Intersect => match reduced {
                Some(reduced) => reduced.intersection(to_reduce).cloned().collect(),
                None => to_reduce.clone(),
            },
            Reduction::MaxWins => {
                // Constraints of one kind order by their payload.
                let Some(max) = to_reduce.iter().max() else {
                    return reduced.cloned().unwrap_or_default();
                };
                let combined = match reduced.and_then(|r| r.iter().next()) {
                    Some(prev) => std::cmp::min(max, prev),
                    None => max,
                };
                BTreeSet::from([combined.clone()])
            }
        }
    }
}
