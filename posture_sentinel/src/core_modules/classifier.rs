// THEORY:
// The `PostureClassifier` turns one frame's landmarks into a `PostureVerdict`. It is
// the spatial half of the sentinel: it knows what a single frame looks like, but
// nothing about how long a posture has lasted. That temporal question belongs to
// the `PostureMonitor`.
//
// The camera is expected to look at the subject side-on, from the left. Two
// inclinations are measured against the vertical:
// - neck:  left shoulder -> left ear
// - torso: left hip -> left shoulder
// Posture is good only while both stay under their thresholds. The distance between
// the two shoulders is reported separately as an alignment hint: seen side-on, the
// shoulders overlap, so a small offset means the camera is well placed.
//
// The classifier holds no state, so it can be shared freely between frames and streams.

use crate::config::ClassifierConfig;
use crate::core_modules::geometry::geometry::{distance, inclination_angle, Degrees, Pixels};
use crate::core_modules::landmarks::{BodyPart, LandmarkSet};
use crate::error::PoseError;
use serde::{Deserialize, Serialize};

/// The result of classifying a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureVerdict {
    /// Inclination of the left shoulder -> left ear segment.
    pub neck_angle: Degrees,
    /// Inclination of the left hip -> left shoulder segment.
    pub torso_angle: Degrees,
    /// Both angles are under their thresholds.
    pub is_good: bool,
    /// Pixel distance between the two shoulders.
    pub alignment_offset: Pixels,
    /// The camera is side-on enough for the angles to be meaningful.
    pub is_aligned: bool,
}

impl PostureVerdict {
    /// `Neck : 20  Torso : 5`, truncated to whole degrees.
    pub fn angle_line(&self) -> String {
        format!("Neck : {}  Torso : {}", self.neck_angle as i64, self.torso_angle as i64)
    }

    /// `42 Aligned` or `180 Not Aligned`.
    pub fn alignment_line(&self) -> String {
        let label = if self.is_aligned { "Aligned" } else { "Not Aligned" };
        format!("{} {}", self.alignment_offset as i64, label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostureClassifier {
    config: ClassifierConfig,
}

impl PostureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, landmarks: &LandmarkSet) -> Result<PostureVerdict, PoseError> {
        let left_shoulder = landmarks.require(BodyPart::LeftShoulder)?;
        let right_shoulder = landmarks.require(BodyPart::RightShoulder)?;
        let left_ear = landmarks.require(BodyPart::LeftEar)?;
        let left_hip = landmarks.require(BodyPart::LeftHip)?;

        let alignment_offset = distance(left_shoulder, right_shoulder);
        let neck_angle = inclination_angle(left_shoulder, left_ear)?;
        let torso_angle = inclination_angle(left_hip, left_shoulder)?;

        Ok(PostureVerdict {
            neck_angle,
            torso_angle,
            is_good: neck_angle < self.config.neck_threshold_deg
                && torso_angle < self.config.torso_threshold_deg,
            alignment_offset,
            is_aligned: alignment_offset < self.config.alignment_threshold_px,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::geometry::Point2D;

    /// Builds a side-on skeleton with the requested neck and torso inclinations.
    fn skeleton(neck_deg: f64, torso_deg: f64) -> LandmarkSet {
        let hip = Point2D::new(300.0, 600.0);
        let torso_len = 250.0;
        let shoulder = Point2D::new(
            hip.x + torso_len * torso_deg.to_radians().sin(),
            hip.y - torso_len * torso_deg.to_radians().cos(),
        );
        let neck_len = 80.0;
        let ear = Point2D::new(
            shoulder.x + neck_len * neck_deg.to_radians().sin(),
            shoulder.y - neck_len * neck_deg.to_radians().cos(),
        );
        LandmarkSet::new()
            .with(BodyPart::LeftHip, hip)
            .with(BodyPart::LeftShoulder, shoulder)
            .with(BodyPart::RightShoulder, Point2D::new(shoulder.x + 30.0, shoulder.y))
            .with(BodyPart::LeftEar, ear)
    }

    #[test]
    fn upright_posture_is_good() {
        let verdict = PostureClassifier::default().classify(&skeleton(20.0, 5.0)).unwrap();
        assert!((verdict.neck_angle - 20.0).abs() < 1e-6);
        assert!((verdict.torso_angle - 5.0).abs() < 1e-6);
        assert!(verdict.is_good);
        assert!(verdict.is_aligned);
    }

    #[test]
    fn slouching_is_bad() {
        let verdict = PostureClassifier::default().classify(&skeleton(40.0, 15.0)).unwrap();
        assert!(!verdict.is_good);
    }

    #[test]
    fn either_angle_alone_makes_posture_bad() {
        let classifier = PostureClassifier::default();
        assert!(!classifier.classify(&skeleton(40.0, 5.0)).unwrap().is_good);
        assert!(!classifier.classify(&skeleton(20.0, 12.0)).unwrap().is_good);
    }

    #[test]
    fn thresholds_are_configurable() {
        let lenient = PostureClassifier::new(ClassifierConfig {
            neck_threshold_deg: 45.0,
            torso_threshold_deg: 20.0,
            ..ClassifierConfig::default()
        });
        assert!(lenient.classify(&skeleton(40.0, 15.0)).unwrap().is_good);
    }

    #[test]
    fn wide_shoulders_are_not_aligned() {
        let mut landmarks = skeleton(10.0, 2.0);
        let shoulder = landmarks.get(BodyPart::LeftShoulder).unwrap();
        landmarks.insert(BodyPart::RightShoulder, Point2D::new(shoulder.x + 160.0, shoulder.y));

        let verdict = PostureClassifier::default().classify(&landmarks).unwrap();
        assert!((verdict.alignment_offset - 160.0).abs() < 1e-9);
        assert!(!verdict.is_aligned);
        assert!(verdict.is_good);
    }

    #[test]
    fn alignment_line_reports_offset_and_label() {
        let verdict = PostureVerdict {
            neck_angle: 12.0,
            torso_angle: 3.0,
            is_good: true,
            alignment_offset: 160.4,
            is_aligned: false,
        };
        assert_eq!(verdict.alignment_line(), "160 Not Aligned");
        let aligned = PostureVerdict { alignment_offset: 42.0, is_aligned: true, ..verdict };
        assert_eq!(aligned.alignment_line(), "42 Aligned");
    }

    #[test]
    fn missing_ear_is_incomplete() {
        let landmarks = LandmarkSet::new()
            .with(BodyPart::LeftShoulder, Point2D::new(1.0, 2.0))
            .with(BodyPart::RightShoulder, Point2D::new(1.0, 2.0))
            .with(BodyPart::LeftHip, Point2D::new(1.0, 9.0));
        assert_eq!(
            PostureClassifier::default().classify(&landmarks),
            Err(PoseError::IncompleteLandmarks(BodyPart::LeftEar))
        );
    }

    #[test]
    fn shoulder_on_top_edge_is_degenerate() {
        let landmarks = LandmarkSet::new()
            .with(BodyPart::LeftShoulder, Point2D::new(100.0, 0.0))
            .with(BodyPart::RightShoulder, Point2D::new(110.0, 0.0))
            .with(BodyPart::LeftEar, Point2D::new(105.0, 20.0))
            .with(BodyPart::LeftHip, Point2D::new(100.0, 300.0));
        assert!(matches!(
            PostureClassifier::default().classify(&landmarks),
            Err(PoseError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn angle_line_truncates() {
        let verdict = PostureClassifier::default().classify(&skeleton(20.7, 5.2)).unwrap();
        assert_eq!(verdict.angle_line(), "Neck : 20  Torso : 5");
    }
}
