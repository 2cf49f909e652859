//! Orbit camera input handling.

use cgmath::{InnerSpace, Point3};
use vantage::camera::UserCamera;

#[test]
fn should_keep_orbiting_past_the_pole() {
    let mut camera = UserCamera::new();
    camera.target = Point3::new(0.0, 0.0, 0.0);
    // Directly above the target: the view direction is parallel to `up`.
    camera.position = Point3::new(0.0, 1.0, 0.0);

    camera.rotate(5.0, 10.0);
    camera.update_position();

    let offset = camera.position - camera.target;
    assert!(offset.x.is_finite() && offset.y.is_finite() && offset.z.is_finite());
    assert!(offset.magnitude() > 0.0);

    // Subsequent input keeps working.
    camera.rotate(0.0, -10.0);
    camera.update_position();
    assert!(camera.position.x.is_finite());
    assert!(camera.position.y.is_finite());
    assert!(camera.position.z.is_finite());
}

#[test]
fn should_preserve_the_orbit_radius_under_rotation() {
    let mut camera = UserCamera::new();
    camera.target = Point3::new(0.0, 0.0, 0.0);
    camera.position = Point3::new(0.0, 0.0, 2.0);

    camera.rotate(30.0, 15.0);
    camera.update_position();

    let radius = (camera.position - camera.target).magnitude();
    assert!((radius - 2.0).abs() < 1e-4);
}
