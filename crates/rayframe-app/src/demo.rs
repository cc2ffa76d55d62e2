// SPDX-License-Identifier: CEPL-1.0
use rayframe_math::glam::Vec3;
use rayframe_math::{Camera, CameraUniform, Material, Scene, Sphere};
use rayframe_render::{FrameContext, SceneHooks, StorageBlob};

/// Radians per second.
const ORBIT_SPEED: f32 = 0.25;
/// World units per key press.
const CAMERA_SPEED: f32 = 0.1;
/// Degrees per key press.
const CAMERA_ROTATION_SPEED: f32 = 5.0;

/// Static spheres over a floor, seen from a slowly orbiting camera until
/// the keyboard takes over.
pub struct DemoScene {
    pub camera: Camera,
    auto_orbit: bool,
    scene: Scene,
    uniform: CameraUniform,
    time: f32,
}

impl DemoScene {
    pub fn new() -> Self {
        let mut scene = Scene::default();
        scene.add_floor(-1.0, 20.0, Material::diffuse(Vec3::splat(0.75), 1.0));
        scene.spheres.push(Sphere::new(
            Vec3::new(0.0, 0.0, 0.0),
            1.0,
            Material::diffuse(Vec3::new(0.85, 0.2, 0.2), 0.3).with_specular(Vec3::ONE, 0.8, 64.0),
        ));
        scene.spheres.push(Sphere::new(
            Vec3::new(-2.2, -0.4, 0.8),
            0.6,
            Material::diffuse(Vec3::new(0.2, 0.6, 0.9), 0.6),
        ));
        scene.spheres.push(Sphere::new(
            Vec3::new(1.8, 0.6, -1.4),
            0.4,
            Material::emissive(Vec3::new(1.0, 0.85, 0.5), 3.0),
        ));

        let camera = Camera {
            eye: Vec3::new(0.0, 1.0, 6.0),
            ..Camera::default()
        };
        let uniform = camera.uniform(1, 1, 0.0);
        Self {
            camera,
            auto_orbit: true,
            scene,
            uniform,
            time: 0.0,
        }
    }

    /// W/S forward and back, A/D strafe, Q/E yaw, Z/X pitch. Returns false
    /// for any other key.
    pub fn steer(&mut self, key: char) -> bool {
        let cam = &mut self.camera;
        match key.to_ascii_lowercase() {
            'w' => cam.move_forward(CAMERA_SPEED),
            's' => cam.move_forward(-CAMERA_SPEED),
            'd' => cam.move_right(CAMERA_SPEED),
            'a' => cam.move_right(-CAMERA_SPEED),
            'q' => cam.rotate_around_up(CAMERA_ROTATION_SPEED),
            'e' => cam.rotate_around_up(-CAMERA_ROTATION_SPEED),
            'z' => cam.rotate_around_right(CAMERA_ROTATION_SPEED),
            'x' => cam.rotate_around_right(-CAMERA_ROTATION_SPEED),
            _ => return false,
        }
        self.auto_orbit = false;
        true
    }

    pub fn triangles(&self) -> StorageBlob<'_> {
        StorageBlob {
            bytes: self.scene.triangle_bytes(),
            element_size: std::mem::size_of::<rayframe_math::Triangle>(),
        }
    }

    pub fn spheres(&self) -> StorageBlob<'_> {
        StorageBlob {
            bytes: self.scene.sphere_bytes(),
            element_size: std::mem::size_of::<Sphere>(),
        }
    }
}

impl Default for DemoScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHooks for DemoScene {
    fn uniforms(&mut self, frame: FrameContext) -> &[u8] {
        self.time += frame.delta_secs;
        if self.auto_orbit {
            self.camera.orbit(frame.delta_secs * ORBIT_SPEED);
        }

        let mut u = self
            .camera
            .uniform(frame.extent.width, frame.extent.height, self.time);
        u.sphere_count = self.scene.spheres.len() as u32;
        u.triangle_count = self.scene.triangles.len() as u32;
        self.uniform = u;
        bytemuck::bytes_of(&self.uniform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayframe_render::RenderSize;

    #[test]
    fn uniform_carries_counts_and_time() {
        let mut demo = DemoScene::new();
        let frame = FrameContext {
            image_index: 0,
            delta_secs: 0.5,
            extent: RenderSize::new(800, 600),
        };
        let bytes = demo.uniforms(frame).to_vec();
        assert_eq!(bytes.len(), std::mem::size_of::<CameraUniform>());
        let u: CameraUniform = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(u.sphere_count, 3);
        assert_eq!(u.triangle_count, 2);
        assert_eq!(u.time, 0.5);
        assert_eq!(u.resolution, [800.0, 600.0]);
    }

    #[test]
    fn keys_move_the_camera_and_stop_the_orbit() {
        let mut demo = DemoScene::new();
        let start = demo.camera;

        assert!(demo.steer('W'));
        let moved = demo.camera;
        assert!(moved.eye.distance(start.eye) > 0.09);

        let frame = FrameContext {
            image_index: 0,
            delta_secs: 1.0,
            extent: RenderSize::new(800, 600),
        };
        demo.uniforms(frame);
        assert_eq!(demo.camera, moved);

        assert!(demo.steer('s'));
        assert!(demo.camera.eye.distance(start.eye) < 1e-5);
        assert!(!demo.steer('p'));
    }

    #[test]
    fn every_bound_key_changes_the_view() {
        for key in ['w', 's', 'a', 'd', 'q', 'e', 'z', 'x'] {
            let mut demo = DemoScene::new();
            let before = demo.camera.view();
            assert!(demo.steer(key));
            assert_ne!(demo.camera.view(), before, "key {key}");
        }
    }

    #[test]
    fn blobs_are_whole_elements() {
        let demo = DemoScene::new();
        let t = demo.triangles();
        assert_eq!(t.bytes.len() % t.element_size, 0);
        let s = demo.spheres();
        assert_eq!(s.bytes.len() / s.element_size, 3);
    }
}
