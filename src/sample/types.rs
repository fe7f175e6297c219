//! Gaze sample types.
//!
//! A [`Sample`] is one capture event: the eye crops and face landmarks seen
//! by one camera at one instant, plus the on-screen target the user was
//! looking at. Samples are immutable once built.

use crate::sample::validation::{check_goal_range, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Width of a single-channel eye crop, in pixels.
pub const EYE_CROP_WIDTH: usize = 48;
/// Height of a single-channel eye crop, in pixels.
pub const EYE_CROP_HEIGHT: usize = 48;
/// Byte length of one eye crop.
pub const EYE_CROP_LEN: usize = EYE_CROP_WIDTH * EYE_CROP_HEIGHT;

/// Number of face landmarks produced by the landmark model.
pub const LANDMARK_COUNT: usize = 478;
/// Number of `f32` values in a sample's landmark array (x, y per landmark).
pub const POINTS_LEN: usize = LANDMARK_COUNT * 2;

/// Length of every identity string (a hyphenated UUID).
pub const IDENTITY_LEN: usize = 36;

/// Separator used when joining identity fields into a bucket key.
pub const BUCKET_SEPARATOR: &str = "|";

/// Key grouping samples that must be serialized together.
pub type BucketKey = String;

/// On-screen gaze target in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub x: f32,
    pub y: f32,
}

impl Goal {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One of the five identity fields of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    User,
    Place,
    Screen,
    Camera,
    Monitor,
}

impl IdentityField {
    /// All identity fields, in wire order.
    pub const ALL: [IdentityField; 5] = [
        IdentityField::User,
        IdentityField::Place,
        IdentityField::Screen,
        IdentityField::Camera,
        IdentityField::Monitor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IdentityField::User => "user_id",
            IdentityField::Place => "place_id",
            IdentityField::Screen => "screen_id",
            IdentityField::Camera => "camera_id",
            IdentityField::Monitor => "monitor_id",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The identity tuple a sample belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub place_id: String,
    pub screen_id: String,
    pub camera_id: String,
    pub monitor_id: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        place_id: impl Into<String>,
        screen_id: impl Into<String>,
        camera_id: impl Into<String>,
        monitor_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            place_id: place_id.into(),
            screen_id: screen_id.into(),
            camera_id: camera_id.into(),
            monitor_id: monitor_id.into(),
        }
    }

    /// Get the value of a single identity field.
    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::User => &self.user_id,
            IdentityField::Place => &self.place_id,
            IdentityField::Screen => &self.screen_id,
            IdentityField::Camera => &self.camera_id,
            IdentityField::Monitor => &self.monitor_id,
        }
    }

    /// Bucket key: the five identity fields joined with `|`.
    pub fn bucket_key(&self) -> BucketKey {
        IdentityField::ALL
            .iter()
            .map(|f| self.field(*f))
            .collect::<Vec<_>>()
            .join(BUCKET_SEPARATOR)
    }
}

/// A named entity handed over by the host application (a user, a place,
/// a screen...). Only its uuid ends up in the identity tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub name: String,
    pub uuid: String,
}

impl NamedEntity {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
        }
    }

    /// Create an entity with a freshly generated v4 uuid.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(name, Uuid::new_v4().to_string())
    }
}

/// One capture event.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    time: u64,
    left_eye: Option<Vec<u8>>,
    right_eye: Option<Vec<u8>>,
    points: Vec<f32>,
    goal: Option<Goal>,
    identity: Identity,
}

impl Sample {
    /// Build a sample without eye crops.
    ///
    /// Fails if a goal is given and either coordinate lies outside [-2, 2].
    /// A missing goal is accepted here; [`crate::SampleManager::store`]
    /// rejects it later.
    pub fn new(
        time: u64,
        identity: Identity,
        points: Vec<f32>,
        goal: Option<Goal>,
    ) -> Result<Self, ValidationError> {
        if let Some(ref g) = goal {
            check_goal_range(g)?;
        }

        Ok(Self {
            time,
            left_eye: None,
            right_eye: None,
            points,
            goal,
            identity,
        })
    }

    /// Attach eye crops. Consumes the sample so it is finished before it is
    /// shared.
    pub fn with_eyes(mut self, left_eye: Option<Vec<u8>>, right_eye: Option<Vec<u8>>) -> Self {
        self.left_eye = left_eye;
        self.right_eye = right_eye;
        self
    }

    /// Capture time in milliseconds since the Unix epoch.
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn left_eye(&self) -> Option<&[u8]> {
        self.left_eye.as_deref()
    }

    pub fn right_eye(&self) -> Option<&[u8]> {
        self.right_eye.as_deref()
    }

    pub fn points(&self) -> &[f32] {
        &self.points
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Key of the bucket this sample belongs to.
    pub fn bucket(&self) -> BucketKey {
        self.identity.bucket_key()
    }
}
