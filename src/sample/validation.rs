//! Stateless validation rules for samples.

use crate::sample::types::{Goal, NamedEntity, Sample};
use std::fmt;
use thiserror::Error;

/// Lower bound of a goal coordinate (inclusive).
pub const GOAL_MIN: f32 = -2.0;
/// Upper bound of a goal coordinate (inclusive).
pub const GOAL_MAX: f32 = 2.0;

/// Goal coordinate named in a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalAxis {
    X,
    Y,
}

impl fmt::Display for GoalAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalAxis::X => f.write_str("x"),
            GoalAxis::Y => f.write_str("y"),
        }
    }
}

/// A sample failed validation and must not be buffered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Goal is missing")]
    GoalMissing,

    #[error("Goal {axis} is out of range [-2, 2]: {value}")]
    GoalOutOfRange { axis: GoalAxis, value: f32 },
}

fn in_range(value: f32) -> bool {
    (GOAL_MIN..=GOAL_MAX).contains(&value)
}

/// Range check for a goal that is known to be present.
pub(crate) fn check_goal_range(goal: &Goal) -> Result<(), ValidationError> {
    if !in_range(goal.x) {
        return Err(ValidationError::GoalOutOfRange {
            axis: GoalAxis::X,
            value: goal.x,
        });
    }
    if !in_range(goal.y) {
        return Err(ValidationError::GoalOutOfRange {
            axis: GoalAxis::Y,
            value: goal.y,
        });
    }
    Ok(())
}

/// True iff the goal is present and both coordinates lie in [-2, 2].
pub fn validate_goal(goal: Option<&Goal>) -> bool {
    goal_validation_error(goal).is_none()
}

/// Describe why a goal is invalid, or `None` if it is valid.
pub fn goal_validation_error(goal: Option<&Goal>) -> Option<ValidationError> {
    match goal {
        None => Some(ValidationError::GoalMissing),
        Some(g) => check_goal_range(g).err(),
    }
}

/// Validate a sample before it is buffered. The goal is the only
/// sample-level invariant checked here.
pub fn validate_sample(sample: &Sample) -> Result<(), ValidationError> {
    match goal_validation_error(sample.goal()) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// True iff the entity is present and has a non-empty name and uuid.
pub fn validate_uuided(entity: Option<&NamedEntity>) -> bool {
    entity
        .map(|e| !e.name.is_empty() && !e.uuid.is_empty())
        .unwrap_or(false)
}
