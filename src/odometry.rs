// Planar odometry from wheel speeds
// Y-forward robot frame: +Y ahead, +X to the right, heading counter-clockwise.

/// Robot pose in the odometry frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    /// Yaw in radians, counter-clockwise
    pub heading: f32,
}

impl Pose {
    /// Advance the pose by `dt` seconds of motion.
    ///
    /// # Arguments
    /// * `left`, `right` - Wheel ground speeds in m/s
    /// * `base_width` - Distance between the wheels in meters
    pub fn integrate(&mut self, left: f32, right: f32, base_width: f32, dt: f32) {
        // Motion over this step expressed in the robot's own frame
        let (dx, dy, rotation) = if left == right {
            (0.0, left * dt, 0.0)
        } else {
            let linear = (right + left) / 2.0;
            let angular = (right - left) / base_width;
            let radius = linear / angular;
            let rotation = angular * dt;
            // The centre of rotation lies on the X axis at -radius
            (
                -radius * (1.0 - rotation.cos()),
                radius * rotation.sin(),
                rotation,
            )
        };

        let (sin, cos) = self.heading.sin_cos();
        self.x += dx * cos - dy * sin;
        self.y += dx * sin + dy * cos;
        self.heading += rotation;
    }
}

/// Ground speed in m/s of a wheel turning at `rev_per_sec`
pub fn wheel_ground_speed(rev_per_sec: f32, wheel_radius: f32) -> f32 {
    rev_per_sec * wheel_radius * 2.0 * std::f32::consts::PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_straight_line() {
        let mut pose = Pose::default();
        for _ in 0..100 {
            pose.integrate(0.5, 0.5, 0.2, 0.01);
        }
        assert!(pose.x.abs() < 1e-6);
        assert!((pose.y - 0.5).abs() < 1e-4);
        assert_eq!(pose.heading, 0.0);
    }

    #[test]
    fn test_spin_in_place() {
        let mut pose = Pose::default();
        // Right forward, left backward: counter-clockwise spin
        pose.integrate(-0.1, 0.1, 0.2, 1.0);
        assert!(pose.x.abs() < 1e-6);
        assert!(pose.y.abs() < 1e-6);
        assert!((pose.heading - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_left_turn_curves_left() {
        let mut pose = Pose::default();
        pose.integrate(0.2, 0.3, 0.2, 0.5);
        assert!(pose.x < 0.0);
        assert!(pose.y > 0.0);
        assert!(pose.heading > 0.0);
    }

    #[test]
    fn test_quarter_turn_lands_left_of_start() {
        // radius 0.5 m, angular 0.5 rad/s, pi seconds = a quarter circle
        let mut pose = Pose::default();
        pose.integrate(0.2, 0.3, 0.2, PI);
        assert!((pose.x + 0.5).abs() < 1e-5, "x = {}", pose.x);
        assert!((pose.y - 0.5).abs() < 1e-5, "y = {}", pose.y);
        assert!((pose.heading - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_full_circle_returns_to_start() {
        let mut pose = Pose::default();
        let base_width = 0.2;
        // angular = 0.5 rad/s, so one revolution takes 4*pi seconds
        let steps = 1000;
        let dt = 4.0 * PI / steps as f32;
        for _ in 0..steps {
            pose.integrate(0.2, 0.3, base_width, dt);
        }
        assert!(pose.x.abs() < 1e-3, "x = {}", pose.x);
        assert!(pose.y.abs() < 1e-3, "y = {}", pose.y);
        assert!((pose.heading - 2.0 * PI).abs() < 1e-3);
    }

    #[test]
    fn test_wheel_ground_speed() {
        assert!((wheel_ground_speed(1.0, 0.05) - 0.1 * PI).abs() < 1e-6);
    }
}
