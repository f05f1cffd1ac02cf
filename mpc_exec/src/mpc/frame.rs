//! World to vehicle frame transformation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Point2;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Clone)]
pub enum FrameError {
    #[error("No waypoints were given")]
    Empty,

    #[error("Waypoint x and y sequences differ in length ({num_x} x, {num_y} y)")]
    LengthMismatch { num_x: usize, num_y: usize },
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Transform world frame waypoints into the vehicle frame.
///
/// The vehicle frame has its origin at `position` with the x axis along `heading_rad`, so the
/// vehicle's own pose in it is always `(0, 0, 0)`.
pub fn to_vehicle_frame(
    ptsx: &[f64],
    ptsy: &[f64],
    position: Point2<f64>,
    heading_rad: f64,
) -> Result<Vec<Point2<f64>>, FrameError> {
    if ptsx.len() != ptsy.len() {
        return Err(FrameError::LengthMismatch {
            num_x: ptsx.len(),
            num_y: ptsy.len(),
        });
    }
    if ptsx.is_empty() {
        return Err(FrameError::Empty);
    }

    let (sin, cos) = heading_rad.sin_cos();

    Ok(ptsx
        .iter()
        .zip(ptsy.iter())
        .map(|(wx, wy)| {
            let dx = wx - position.x;
            let dy = wy - position.y;
            Point2::new(dx * cos + dy * sin, -dx * sin + dy * cos)
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_translation() {
        let pts = to_vehicle_frame(&[1.0, 2.0], &[3.0, 5.0], Point2::new(1.0, 1.0), 0.0).unwrap();

        assert_eq!(pts, vec![Point2::new(0.0, 2.0), Point2::new(1.0, 4.0)]);
    }

    #[test]
    fn test_rotation() {
        // Facing along world +y, so a point ahead on world y is ahead on vehicle x and a point on
        // world +x is to the vehicle's right (negative y)
        let pts = to_vehicle_frame(&[0.0, 2.0], &[3.0, 0.0], Point2::origin(), FRAC_PI_2).unwrap();

        assert_abs_diff_eq!(pts[0].x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[0].y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[1].x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[1].y, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_is_origin() {
        let pts = to_vehicle_frame(&[-4.2], &[7.1], Point2::new(-4.2, 7.1), 1.234).unwrap();

        assert_abs_diff_eq!(pts[0].x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[0].y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_shape() {
        assert_eq!(
            to_vehicle_frame(&[], &[], Point2::origin(), 0.0),
            Err(FrameError::Empty)
        );
        assert_eq!(
            to_vehicle_frame(&[1.0, 2.0], &[1.0], Point2::origin(), 0.0),
            Err(FrameError::LengthMismatch { num_x: 2, num_y: 1 })
        );
    }
}
