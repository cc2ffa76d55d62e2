// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

/// Pitch stops about one degree short of looking straight along `up`.
const MAX_PITCH_COS: f32 = 0.9998;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 45.0,
            near: 0.1,
            far: 300.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Right-handed perspective with 0..1 depth and Y pointing down in clip
    /// space, as Vulkan expects.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y.to_radians(), aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Rotates the eye around `target` about the world Y axis.
    pub fn orbit(&mut self, radians: f32) {
        let offset = self.eye - self.target;
        self.eye = self.target + Quat::from_rotation_y(radians) * offset;
    }

    fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize()
    }

    fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// Moves eye and target together along the view direction.
    pub fn move_forward(&mut self, distance: f32) {
        let step = self.forward() * distance;
        self.eye += step;
        self.target += step;
    }

    /// Strafes eye and target together; positive moves right.
    pub fn move_right(&mut self, distance: f32) {
        let step = self.right() * distance;
        self.eye += step;
        self.target += step;
    }

    /// Yaw about `up`, pivoting on the eye. Positive turns left.
    pub fn rotate_around_up(&mut self, degrees: f32) {
        let rot = Quat::from_axis_angle(self.up.normalize(), degrees.to_radians());
        self.target = self.eye + rot * (self.target - self.eye);
    }

    /// Pitch about the camera's right axis, pivoting on the eye. Positive
    /// looks up. A pitch that would line the view up with `up` is dropped.
    pub fn rotate_around_right(&mut self, degrees: f32) {
        let rot = Quat::from_axis_angle(self.right(), degrees.to_radians());
        let offset = rot * (self.target - self.eye);
        if offset.normalize().dot(self.up.normalize()).abs() > MAX_PITCH_COS {
            return;
        }
        self.target = self.eye + offset;
    }

    pub fn uniform(&self, width: u32, height: u32, time: f32) -> CameraUniform {
        let aspect = if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        };
        CameraUniform {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            view: self.view().to_cols_array_2d(),
            proj: self.projection(aspect).to_cols_array_2d(),
            eye: self.eye.extend(1.0).to_array(),
            resolution: [width as f32, height as f32],
            time,
            sphere_count: 0,
            triangle_count: 0,
            _pad: [0; 3],
        }
    }
}

/// std140 block bound at set 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    pub sphere_count: u32,
    pub triangle_count: u32,
    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn uniform_is_240_bytes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 240);
        let u = Camera::default().uniform(800, 600, 0.0);
        assert_eq!(bytemuck::bytes_of(&u).len(), 240);
    }

    #[test]
    fn view_maps_eye_to_origin_and_target_down_negative_z() {
        let cam = Camera::default();
        let view = cam.view();
        assert!(close(view.transform_point3(cam.eye), Vec3::ZERO));
        assert!(close(view.transform_point3(cam.target), Vec3::new(0.0, 0.0, -3.0)));
    }

    #[test]
    fn projection_flips_y() {
        let cam = Camera::default();
        let p = cam.projection(1.0).project_point3(Vec3::new(0.0, 1.0, -5.0));
        assert!(p.y < 0.0);
    }

    #[test]
    fn move_forward_carries_target_along() {
        let mut cam = Camera::default();
        cam.move_forward(1.0);
        assert!(close(cam.eye, Vec3::new(0.0, 0.0, 2.0)));
        assert!(close(cam.target, Vec3::new(0.0, 0.0, -1.0)));
        cam.move_forward(-1.0);
        assert!(close(cam.eye, Camera::default().eye));
    }

    #[test]
    fn move_right_strafes_along_positive_x_by_default() {
        let mut cam = Camera::default();
        cam.move_right(0.5);
        assert!(close(cam.eye, Vec3::new(0.5, 0.0, 3.0)));
        assert!(close(cam.target, Vec3::new(0.5, 0.0, 0.0)));
    }

    #[test]
    fn yaw_pivots_on_the_eye() {
        let mut cam = Camera::default();
        cam.rotate_around_up(90.0);
        assert!(close(cam.eye, Vec3::new(0.0, 0.0, 3.0)));
        assert!(close(cam.target, Vec3::new(-3.0, 0.0, 3.0)));
    }

    #[test]
    fn pitch_looks_up_and_stops_short_of_vertical() {
        let mut cam = Camera::default();
        cam.rotate_around_right(30.0);
        assert!(close(cam.eye, Vec3::new(0.0, 0.0, 3.0)));
        assert!((cam.target.y - 1.5).abs() < 1e-4);
        assert!((cam.eye.distance(cam.target) - 3.0).abs() < 1e-4);

        let before = cam.target;
        cam.rotate_around_right(60.0);
        assert_eq!(cam.target, before);
        assert!(cam.view().is_finite());
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut cam = Camera::default();
        cam.orbit(std::f32::consts::FRAC_PI_2);
        assert!((cam.eye.distance(cam.target) - 3.0).abs() < 1e-5);
        assert!(close(cam.eye, Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let u = Camera::default().uniform(640, 0, 1.5);
        assert!(u.proj.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(u.time, 1.5);
    }
}
