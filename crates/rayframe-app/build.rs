use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Fullscreen quad. Matches QuadVertex:
    //   - binding 0, location 0: R32G32_SFLOAT (pos)
    //   - binding 0, location 1: R32G32B32_SFLOAT (color)
    let vs_src = r#"
#version 450
layout(location = 0) in vec2 inPos;
layout(location = 1) in vec3 inColor;

layout(location = 0) out vec2 vNdc;
layout(location = 1) out vec3 vColor;

void main() {
    vNdc = inPos;
    vColor = inColor;
    gl_Position = vec4(inPos, 0.0, 1.0);
}
"#;

    // Per-pixel ray cast against the storage buffers. Layouts mirror
    // rayframe-math (CameraUniform std140, Material/Sphere/Triangle std430).
    let fs_src = r#"
#version 450
layout(location = 0) in vec2 vNdc;
layout(location = 1) in vec3 vColor;
layout(location = 0) out vec4 outColor;

struct Material {
    vec3 albedo;        float _p0;
    vec3 specular;      float _p1;
    vec3 emission;      float emissionStrength;
    float roughness;
    float specularHighlight;
    float specularExponent;
    float _p2;
};
struct Sphere { vec3 center; float radius; Material m; };
struct Triangle { vec4 v0; vec4 v1; vec4 v2; Material m; };

layout(set = 0, binding = 0) uniform Camera {
    mat4 model;
    mat4 view;
    mat4 proj;
    vec4 eye;
    vec2 resolution;
    float time;
    uint sphereCount;
    uint triangleCount;
} cam;
layout(std430, set = 0, binding = 1) readonly buffer Triangles { Triangle tris[]; };
layout(std430, set = 0, binding = 2) readonly buffer Spheres { Sphere spheres[]; };

const float FAR = 1e30;

float hitSphere(Sphere s, vec3 ro, vec3 rd) {
    vec3 oc = ro - s.center;
    float b = dot(oc, rd);
    float c = dot(oc, oc) - s.radius * s.radius;
    float h = b * b - c;
    if (h < 0.0) return FAR;
    h = sqrt(h);
    float t = -b - h;
    if (t > 1e-3) return t;
    t = -b + h;
    return t > 1e-3 ? t : FAR;
}

float hitTriangle(Triangle tr, vec3 ro, vec3 rd) {
    vec3 e1 = tr.v1.xyz - tr.v0.xyz;
    vec3 e2 = tr.v2.xyz - tr.v0.xyz;
    vec3 p = cross(rd, e2);
    float det = dot(e1, p);
    if (abs(det) < 1e-8) return FAR;
    float inv = 1.0 / det;
    vec3 s = ro - tr.v0.xyz;
    float u = dot(s, p) * inv;
    if (u < 0.0 || u > 1.0) return FAR;
    vec3 q = cross(s, e1);
    float v = dot(rd, q) * inv;
    if (v < 0.0 || u + v > 1.0) return FAR;
    float t = dot(e2, q) * inv;
    return t > 1e-3 ? t : FAR;
}

bool trace(vec3 ro, vec3 rd, out float tHit, out vec3 n, out Material m) {
    tHit = FAR;
    for (uint i = 0u; i < cam.sphereCount; ++i) {
        float t = hitSphere(spheres[i], ro, rd);
        if (t < tHit) {
            tHit = t;
            n = normalize(ro + rd * t - spheres[i].center);
            m = spheres[i].m;
        }
    }
    for (uint i = 0u; i < cam.triangleCount; ++i) {
        float t = hitTriangle(tris[i], ro, rd);
        if (t < tHit) {
            tHit = t;
            Triangle tr = tris[i];
            n = normalize(cross(tr.v1.xyz - tr.v0.xyz, tr.v2.xyz - tr.v0.xyz));
            if (dot(n, rd) > 0.0) n = -n;
            m = tr.m;
        }
    }
    return tHit < FAR;
}

void main() {
    vec4 target = inverse(cam.proj) * vec4(vNdc, 1.0, 1.0);
    vec3 dirView = normalize(target.xyz / target.w);
    mat4 camToWorld = inverse(cam.view);
    vec3 ro = cam.eye.xyz;
    vec3 rd = normalize((camToWorld * vec4(dirView, 0.0)).xyz);

    vec3 sky = mix(vec3(0.9, 0.95, 1.0), vec3(0.35, 0.55, 0.9), clamp(rd.y * 0.5 + 0.5, 0.0, 1.0));

    float t;
    vec3 n;
    Material m;
    if (!trace(ro, rd, t, n, m)) {
        outColor = vec4(mix(sky, vColor, 0.05), 1.0);
        return;
    }

    vec3 p = ro + rd * t;
    vec3 l = normalize(vec3(cos(cam.time * 0.3), 1.2, sin(cam.time * 0.3)));
    float ts;
    vec3 ns;
    Material ms;
    float shadow = trace(p + n * 1e-3, l, ts, ns, ms) ? 0.2 : 1.0;

    float diff = max(dot(n, l), 0.0) * shadow;
    vec3 h = normalize(l - rd);
    float spec = pow(max(dot(n, h), 0.0), max(m.specularExponent, 1.0)) * m.specularHighlight * shadow;

    vec3 color = m.albedo * (0.08 + diff) + m.specular * spec + m.emission * m.emissionStrength;
    outColor = vec4(color, 1.0);
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();

    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "quad.vert",
            "main",
            Some(&opts),
        )
        .unwrap();

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "raytrace.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("quad.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("raytrace.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
