//! Embedded WGSL shaders and their validation
//!
//! Bind group conventions shared by the scene shaders:
//! - group 0: frame uniforms (view, projection) of the camera being rendered
//! - group 1: per-object uniforms
//! - group 2: shading uniforms plus the shadow map and its comparison sampler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("WGSL parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Entry point '{0}' not found")]
    MissingEntryPoint(String),
}

/// Parse and validate a WGSL module
pub fn validate_wgsl(source: &str) -> Result<naga::Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| ShaderError::Parse(e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator
        .validate(&module)
        .map_err(|e| ShaderError::Validation(format!("{e}")))?;

    Ok(module)
}

/// Check that `module` exports `name` for `stage`
pub fn require_entry_point(
    module: &naga::Module,
    name: &str,
    stage: naga::ShaderStage,
) -> Result<(), ShaderError> {
    module
        .entry_points
        .iter()
        .any(|ep| ep.name == name && ep.stage == stage)
        .then_some(())
        .ok_or_else(|| ShaderError::MissingEntryPoint(name.to_string()))
}

/// Depth-only scene rendering from the light.
///
/// `fs_main` is only used when the shadow target carries a color attachment;
/// it writes the fragment depth as gray for debug display.
pub const DEPTH_SHADER: &str = r#"
struct FrameUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: FrameUniforms;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.clip_position = camera.view_proj * object.model * vec4<f32>(input.position, 1.0);
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let depth = input.clip_position.z;
    return vec4<f32>(depth, depth, depth, 1.0);
}
"#;

/// Main-pass shading with a projective shadow lookup and a spot cone.
///
/// Lighting happens in camera view space; `shadow_matrix` takes a view-space
/// position straight into shadow-map `(u, v, depth)`.
pub const SHADING_SHADER: &str = r#"
struct FrameUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
}

struct ShadingUniforms {
    shadow_matrix: mat4x4<f32>,
    view_inverse: mat4x4<f32>,
    // xyz: view-space light position
    light_position: vec4<f32>,
    // xyz: view-space spot direction
    light_direction: vec4<f32>,
    // rgb: color, a: intensity
    light_color: vec4<f32>,
    // x: cos(inner), y: cos(outer)
    spot: vec4<f32>,
    // x: spot enabled, y: soft falloff, z: hardware pcf
    flags: vec4<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) view_position: vec3<f32>,
    @location(1) view_normal: vec3<f32>,
    @location(2) shadow_coord: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: FrameUniforms;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;
@group(2) @binding(0) var<uniform> shading: ShadingUniforms;
@group(2) @binding(1) var shadow_map: texture_depth_2d;
@group(2) @binding(2) var shadow_sampler: sampler_comparison;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let view_pos = camera.view * object.model * vec4<f32>(input.position, 1.0);
    output.clip_position = camera.proj * view_pos;
    output.view_position = view_pos.xyz;
    output.view_normal = (camera.view * object.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz;
    output.shadow_coord = shading.shadow_matrix * view_pos;
    return output;
}

fn spot_factor(to_fragment: vec3<f32>) -> f32 {
    if shading.flags.x < 0.5 {
        return 1.0;
    }
    let cos_angle = dot(to_fragment, normalize(shading.light_direction.xyz));
    // an inverted cone has no falloff band
    if shading.flags.y > 0.5 && shading.spot.x > shading.spot.y {
        return smoothstep(shading.spot.y, shading.spot.x, cos_angle);
    }
    return select(0.0, 1.0, cos_angle > shading.spot.y);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let coord = input.shadow_coord.xyz / input.shadow_coord.w;
    // texture rows run top to bottom
    let uv = vec2<f32>(coord.x, 1.0 - coord.y);
    let visibility = textureSampleCompare(shadow_map, shadow_sampler, uv, coord.z);

    let to_light = shading.light_position.xyz - input.view_position;
    let distance_sq = max(dot(to_light, to_light), 1e-4);
    let l = normalize(to_light);
    let n = normalize(input.view_normal);

    let irradiance = shading.light_color.rgb * shading.light_color.a / distance_sq;
    let diffuse = max(dot(n, l), 0.0) * irradiance * spot_factor(-l) * visibility;
    let ambient = vec3<f32>(0.02);

    return vec4<f32>(object.base_color.rgb * (ambient + diffuse), object.base_color.a);
}
"#;

/// Point-sprite particles, tinted and faded by normalized age
pub const PARTICLE_SHADER: &str = r#"
struct ParticleUniforms {
    view_proj: mat4x4<f32>,
    color_young: vec4<f32>,
    color_old: vec4<f32>,
}

struct VertexInput {
    // xyz: world position, w: normalized age
    @location(0) data: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) age: f32,
}

@group(0) @binding(0) var<uniform> particles: ParticleUniforms;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.clip_position = particles.view_proj * vec4<f32>(input.data.xyz, 1.0);
    output.age = input.data.w;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = mix(particles.color_young, particles.color_old, input.age);
    let fade = 1.0 - input.age;
    return vec4<f32>(color.rgb * fade, fade);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_shaders_validate() {
        for (name, source) in [
            ("depth", DEPTH_SHADER),
            ("shading", SHADING_SHADER),
            ("particle", PARTICLE_SHADER),
        ] {
            let module = validate_wgsl(source).unwrap_or_else(|e| panic!("{name}: {e}"));
            require_entry_point(&module, "vs_main", naga::ShaderStage::Vertex).unwrap();
            require_entry_point(&module, "fs_main", naga::ShaderStage::Fragment).unwrap();
        }
    }

    #[test]
    fn parse_errors_are_reported() {
        let result = validate_wgsl("fn broken( {");
        assert!(matches!(result, Err(ShaderError::Parse(_))));
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let module = validate_wgsl(PARTICLE_SHADER).unwrap();
        let result = require_entry_point(&module, "cs_main", naga::ShaderStage::Compute);
        assert!(matches!(result, Err(ShaderError::MissingEntryPoint(_))));
    }
}
