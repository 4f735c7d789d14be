use stereo_core::{Mat3, Observation, PinholeCamera, Pt2, Real, Vec3};
use stereo_linear::{compute_correspond_epilines, EpilineImage};

use crate::error::{Stage, StereoError};
use crate::stereo::{paired_corners, StereoCalibration};

/// Mean symmetric point-to-epiline distance, in undistorted pixels.
///
/// Each point is undistorted with its camera, then `|p1·l1| + |p2·l2|` is
/// accumulated with `l2 = F·p1`, `l1 = Fᵀ·p2` (normalized lines) and the sum
/// divided by the number of correspondences. Returns 0 for no points and
/// rejects point lists of different lengths.
pub fn epipolar_score(
    points1: &[Pt2],
    points2: &[Pt2],
    f: &Mat3,
    camera1: &PinholeCamera,
    camera2: &PinholeCamera,
) -> Result<Real, StereoError> {
    if points1.len() != points2.len() {
        return Err(StereoError::MismatchedObservationSets {
            stage: Stage::Stereo,
            reason: format!(
                "{} points in image 1, {} in image 2",
                points1.len(),
                points2.len()
            ),
        });
    }
    let n = points1.len();
    if n == 0 {
        return Ok(0.0);
    }
    let u1 = camera1.undistort_pixels(points1);
    let u2 = camera2.undistort_pixels(points2);
    let lines2 = compute_correspond_epilines(&u1, EpilineImage::First, f);
    let lines1 = compute_correspond_epilines(&u2, EpilineImage::Second, f);

    let total: Real = u1
        .iter()
        .zip(&u2)
        .zip(lines1.iter().zip(&lines2))
        .map(|((p1, p2), (l1, l2))| {
            let h1 = Vec3::new(p1.x, p1.y, 1.0);
            let h2 = Vec3::new(p2.x, p2.y, 1.0);
            h1.dot(l1).abs() + h2.dot(l2).abs()
        })
        .sum();
    Ok(total / n as Real)
}

/// Scores a finished stereo calibration on its observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpipolarValidator;

impl EpipolarValidator {
    pub fn score(
        &self,
        observations1: &[Observation],
        observations2: &[Observation],
        calibration: &StereoCalibration,
    ) -> Result<Real, StereoError> {
        let (p1, p2) = paired_corners(observations1, observations2, Stage::Stereo)?;
        epipolar_score(
            &p1,
            &p2,
            &calibration.geometry.fundamental,
            &calibration.camera1,
            &calibration.camera2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::{FxFyCxCySkew, Pt3};

    fn camera() -> PinholeCamera {
        PinholeCamera::ideal(FxFyCxCySkew::new(400.0, 400.0, 200.0, 150.0))
    }

    #[test]
    fn unequal_point_lists_are_rejected() {
        let cam = camera();
        let f = Mat3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0);
        let p1 = [Pt2::new(10.0, 20.0), Pt2::new(30.0, 40.0), Pt2::new(50.0, 60.0)];
        let p2 = [Pt2::new(5.0, 20.0)];
        let err = epipolar_score(&p1, &p2, &f, &cam, &cam).unwrap_err();
        assert!(matches!(
            err,
            StereoError::MismatchedObservationSets {
                stage: Stage::Stereo,
                ..
            }
        ));
    }

    #[test]
    fn pure_horizontal_shift_scores_row_offsets() {
        let cam = camera();
        // F of a rig translated along x: epipolar lines are image rows.
        let f = Mat3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0);
        let p1 = [Pt2::new(100.0, 80.0), Pt2::new(250.0, 120.0)];
        let p2 = [Pt2::new(90.0, 80.0), Pt2::new(240.0, 121.0)];
        let score = epipolar_score(&p1, &p2, &f, &cam, &cam).unwrap();
        // First pair on the same row, second one row apart in both images.
        assert!((score - 1.0).abs() < 1e-9, "score {score}");
    }

    #[test]
    fn validator_rejects_mismatched_views() {
        let a = Observation::new(vec![Pt3::origin(); 4], vec![Pt2::origin(); 4]).unwrap();
        let b = Observation::new(vec![Pt3::origin(); 3], vec![Pt2::origin(); 3]).unwrap();
        let err = paired_corners(&[a.clone(), a.clone()], &[a.clone()], Stage::Stereo).unwrap_err();
        assert!(matches!(err, StereoError::MismatchedObservationSets { .. }));
        let err = paired_corners(&[a], &[b], Stage::Stereo).unwrap_err();
        assert!(matches!(err, StereoError::MismatchedObservationSets { .. }));
    }
}
