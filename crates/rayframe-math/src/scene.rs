// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// std430 material, 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Material {
    pub albedo: [f32; 3],
    pub _pad0: f32,
    pub specular: [f32; 3],
    pub _pad1: f32,
    pub emission: [f32; 3],
    pub emission_strength: f32,
    pub roughness: f32,
    pub specular_highlight: f32,
    pub specular_exponent: f32,
    pub _pad2: f32,
}

impl Material {
    pub fn diffuse(albedo: Vec3, roughness: f32) -> Self {
        Self {
            albedo: albedo.to_array(),
            roughness,
            ..Self::default()
        }
    }

    pub fn emissive(color: Vec3, strength: f32) -> Self {
        Self {
            emission: color.to_array(),
            emission_strength: strength,
            ..Self::default()
        }
    }

    pub fn with_specular(mut self, specular: Vec3, highlight: f32, exponent: f32) -> Self {
        self.specular = specular.to_array();
        self.specular_highlight = highlight;
        self.specular_exponent = exponent;
        self
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub center: [f32; 3],
    pub radius: f32,
    pub material: Material,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, material: Material) -> Self {
        Self {
            center: center.to_array(),
            radius,
            material,
        }
    }
}

/// Vertices are padded to vec4 for std430.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub v0: [f32; 4],
    pub v1: [f32; 4],
    pub v2: [f32; 4],
    pub material: Material,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, material: Material) -> Self {
        Self {
            v0: v0.extend(0.0).to_array(),
            v1: v1.extend(0.0).to_array(),
            v2: v2.extend(0.0).to_array(),
            material,
        }
    }
}

/// Flat object lists uploaded verbatim into the storage buffers.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
    pub triangles: Vec<Triangle>,
}

impl Scene {
    pub fn sphere_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.spheres)
    }

    pub fn triangle_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.triangles)
    }

    /// Adds an axis-aligned quad on the plane `y = height` as two triangles.
    pub fn add_floor(&mut self, height: f32, half_extent: f32, material: Material) {
        let h = half_extent;
        let p = |x: f32, z: f32| Vec3::new(x, height, z);
        self.triangles
            .push(Triangle::new(p(-h, -h), p(-h, h), p(h, h), material));
        self.triangles
            .push(Triangle::new(p(-h, -h), p(h, h), p(h, -h), material));
    }
}
