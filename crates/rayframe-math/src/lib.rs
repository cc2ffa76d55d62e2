// SPDX-License-Identifier: CEPL-1.0
//! CPU-side scene and camera data, laid out exactly as the shaders read it.
mod camera;
mod scene;

pub use camera::{Camera, CameraUniform};
pub use scene::{Material, Scene, Sphere, Triangle};

pub use glam;
