//! Sample model and validation.
//!
//! This module contains:
//! - The immutable [`Sample`] entity and its identity tuple
//! - Stateless goal and entity validation rules

pub mod types;
pub mod validation;

// Re-export commonly used types
pub use types::{
    BucketKey, Goal, Identity, IdentityField, NamedEntity, Sample, EYE_CROP_HEIGHT, EYE_CROP_LEN,
    EYE_CROP_WIDTH, IDENTITY_LEN, LANDMARK_COUNT, POINTS_LEN,
};
pub use validation::{
    goal_validation_error, validate_goal, validate_sample, validate_uuided, GoalAxis,
    ValidationError, GOAL_MAX, GOAL_MIN,
};
