//! World-space angle readout.

use crate::host::scene::SceneObject;

/// π as the published angle series has always been computed with. Kept
/// truncated so values stay comparable with recorded runs.
#[allow(clippy::approx_constant)]
pub const PI_APPROX: f64 = 3.14159265;

pub fn radians_to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI_APPROX
}

/// Rotation about the world X axis in degrees, or `None` if the object's
/// transform is unusable.
pub fn rotation_x_degrees(object: &SceneObject) -> Option<f64> {
    let transform = &object.matrix_world;
    if !transform.rotation.is_finite() {
        return None;
    }
    Some(radians_to_degrees(transform.euler_xyz()[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::scene::{Matrix3, Transform};
    use std::f64::consts::FRAC_PI_2;

    fn object(rotation: Matrix3) -> SceneObject {
        SceneObject::new("Pendule", Transform::new(rotation, [0.0; 3]))
    }

    #[test]
    fn quarter_turn_reads_ninety_degrees() {
        let degrees = rotation_x_degrees(&object(Matrix3::rotation_x(FRAC_PI_2))).expect("angle");
        assert!((degrees - 90.0).abs() < 5e-5);
        assert_eq!((degrees * 10_000.0).round() / 10_000.0, 90.0);
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn conversion_uses_the_truncated_constant() {
        let degrees = radians_to_degrees(FRAC_PI_2);
        assert_eq!(degrees, FRAC_PI_2 * 180.0 / 3.14159265);
        assert_ne!(degrees, FRAC_PI_2.to_degrees());
        assert!(degrees > 90.0);
    }

    #[test]
    fn only_the_x_component_is_reported() {
        let rotation = Matrix3::rotation_z(0.3).mul(&Matrix3::rotation_x(-0.5));
        let degrees = rotation_x_degrees(&object(rotation)).expect("angle");
        assert!((degrees - radians_to_degrees(-0.5)).abs() < 1e-9);
    }

    #[test]
    fn non_finite_transform_is_rejected() {
        let broken = Matrix3::from_rows([[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(rotation_x_degrees(&object(broken)), None);
    }
}
