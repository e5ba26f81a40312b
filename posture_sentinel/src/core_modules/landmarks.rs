// THEORY:
// A `LandmarkSet` is what the external pose model hands us for a single frame: a
// handful of named body keypoints in pixel space. The model usually knows about
// many more keypoints than the sentinel uses; the set keeps whatever it is given
// and the classifier asks only for the four parts it needs.
//
// A frame where the model saw nobody is not an empty set. It is `None` at the
// estimator boundary, which the acquisition loop treats as "no observation".

use crate::core_modules::geometry::geometry::Point2D;
use crate::error::PoseError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Body parts the sentinel knows how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Nose,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
}

impl BodyPart {
    /// The parts the posture classifier cannot work without.
    pub const REQUIRED: [BodyPart; 4] = [
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftEar,
        BodyPart::LeftHip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyPart::Nose => "nose",
            BodyPart::LeftEar => "left_ear",
            BodyPart::RightEar => "right_ear",
            BodyPart::LeftShoulder => "left_shoulder",
            BodyPart::RightShoulder => "right_shoulder",
            BodyPart::LeftHip => "left_hip",
            BodyPart::RightHip => "right_hip",
        }
    }

    /// Looks a part up by its snake_case name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            BodyPart::Nose,
            BodyPart::LeftEar,
            BodyPart::RightEar,
            BodyPart::LeftShoulder,
            BodyPart::RightShoulder,
            BodyPart::LeftHip,
            BodyPart::RightHip,
        ]
        .into_iter()
        .find(|part| part.as_str() == name)
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named keypoints for one frame, in pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: HashMap<BodyPart, Point2D>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: BodyPart, point: Point2D) -> Self {
        self.insert(part, point);
        self
    }

    pub fn insert(&mut self, part: BodyPart, point: Point2D) {
        self.points.insert(part, point);
    }

    pub fn get(&self, part: BodyPart) -> Option<Point2D> {
        self.points.get(&part).copied()
    }

    /// Like `get`, but a missing part is an `IncompleteLandmarks` error.
    pub fn require(&self, part: BodyPart) -> Result<Point2D, PoseError> {
        self.get(part).ok_or(PoseError::IncompleteLandmarks(part))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<(BodyPart, Point2D)> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = (BodyPart, Point2D)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// The external pose model: turns one frame into landmarks, or `None` when nobody is visible.
pub trait PoseEstimator<F> {
    fn estimate(&mut self, frame: &F) -> Option<LandmarkSet>;
}

/// Frames that already carry their landmarks pass straight through.
impl PoseEstimator<Option<LandmarkSet>> for () {
    fn estimate(&mut self, frame: &Option<LandmarkSet>) -> Option<LandmarkSet> {
        frame.clone()
    }
}
