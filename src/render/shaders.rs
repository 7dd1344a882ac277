//! WGSL sources. Struct layouts must stay in sync with `render::common`.

pub const DEPTH_SHADER: &str = r#"
struct DepthView {
    view_proj: mat4x4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> depth_view: DepthView;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @invariant @builtin(position) vec4<f32> {
    let world = object.model * vec4<f32>(position, 1.0);
    return depth_view.view_proj * world;
}
"#;

pub const COLOR_SHADER: &str = r#"
const TILE_SIZE: u32 = 16u;
const MAX_LIGHTS_PER_TILE: u32 = 1024u;
// Fraction of the fragment depth compared against the shadow map.
const SHADOW_BIAS: f32 = 0.9995;

struct FrameUniform {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    camera_position: vec4<f32>,
    cascade_splits: vec4<f32>,
    light_view_proj: array<mat4x4<f32>, 4>,
    tiles_x: u32,
    render_mode: u32,
    cascade_count: u32,
    shadow_map_size: f32,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

struct PointLight {
    color: vec3<f32>,
    intensity: f32,
    position: vec3<f32>,
    radius: f32,
}

struct Sun {
    color: vec3<f32>,
    brightness: f32,
    direction: vec3<f32>,
    ambient: f32,
}

@group(0) @binding(0)
var<uniform> frame: FrameUniform;
@group(0) @binding(1)
var shadow_map: texture_depth_2d_array;
@group(0) @binding(2)
var shadow_sampler: sampler_comparison;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;

@group(2) @binding(0)
var<storage, read> lights: array<PointLight>;
@group(2) @binding(1)
var<storage, read> visible: array<i32>;
@group(2) @binding(2)
var<uniform> sun: Sun;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @invariant @builtin(position) clip: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) view_depth: f32,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = object.model * vec4<f32>(input.position, 1.0);
    out.clip = frame.view_proj * world;
    out.world_position = world.xyz;
    let normal_matrix = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    );
    out.normal = normalize(normal_matrix * input.normal);
    out.view_depth = -(frame.view * world).z;
    return out;
}

fn shadow_coords(cascade: u32, world_position: vec3<f32>) -> vec3<f32> {
    let clip = frame.light_view_proj[cascade] * vec4<f32>(world_position, 1.0);
    let ndc = clip.xyz / clip.w;
    return vec3<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z);
}

fn select_cascade(world_position: vec3<f32>, view_depth: f32) -> i32 {
    for (var i = 0u; i < frame.cascade_count; i++) {
        if (view_depth < frame.cascade_splits[i]) {
            let coords = shadow_coords(i, world_position);
            if (all(coords.xy >= vec2<f32>(0.0)) && all(coords.xy <= vec2<f32>(1.0))) {
                return i32(i);
            }
        }
    }
    return -1;
}

// 3x3 PCF; each occluded tap removes a tenth of the light.
fn shadow_factor(cascade: u32, coords: vec3<f32>) -> f32 {
    let texel = 1.0 / frame.shadow_map_size;
    let reference = coords.z * SHADOW_BIAS;
    var factor = 1.0;
    for (var x = -1; x <= 1; x++) {
        for (var y = -1; y <= 1; y++) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            let lit = textureSampleCompareLevel(
                shadow_map,
                shadow_sampler,
                coords.xy + offset,
                cascade,
                reference
            );
            factor -= 0.1 * (1.0 - lit);
        }
    }
    return factor;
}

fn tile_offset(frag_coord: vec4<f32>) -> u32 {
    let tile = vec2<u32>(frag_coord.xy) / TILE_SIZE;
    return (tile.y * frame.tiles_x + tile.x) * MAX_LIGHTS_PER_TILE;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let offset = tile_offset(input.clip);
    let normal = normalize(input.normal);

    if (frame.render_mode == 1u) {
        var count = 0u;
        loop {
            if (count >= MAX_LIGHTS_PER_TILE || visible[offset + count] == -1) {
                break;
            }
            count++;
        }
        return vec4<f32>(vec3<f32>(f32(count) / 256.0 + 0.1), 1.0);
    }
    if (frame.render_mode == 2u) {
        return vec4<f32>(abs(normal), 1.0);
    }

    var point_color = vec3<f32>(0.0);
    for (var i = 0u; i < MAX_LIGHTS_PER_TILE; i++) {
        let index = visible[offset + i];
        if (index == -1) {
            break;
        }
        let light = lights[u32(index)];
        let to_light = light.position - input.world_position;
        let dist = length(to_light);
        let n_dot_l = max(dot(normal, to_light / max(dist, 0.0001)), 0.0);
        let attenuation = 1.0 - clamp(dist / light.radius, 0.0, 1.0);
        point_color += attenuation * n_dot_l * light.color * light.intensity;
    }

    let sun_n_dot_l = max(dot(normal, -sun.direction), 0.0);
    let sun_color = sun_n_dot_l * sun.color * sun.brightness;

    var tints = array<vec3<f32>, 4>(
        vec3<f32>(1.0, 0.5, 0.5),
        vec3<f32>(0.5, 0.5, 1.0),
        vec3<f32>(0.5, 1.0, 0.5),
        vec3<f32>(1.0, 1.0, 0.5)
    );
    var shadow = 1.0;
    var tint = vec3<f32>(1.0);
    let cascade = select_cascade(input.world_position, input.view_depth);
    if (cascade >= 0) {
        let index = u32(cascade);
        shadow = shadow_factor(index, shadow_coords(index, input.world_position));
        if (frame.render_mode == 3u) {
            tint = tints[index];
        }
    }
    // No direct sunlight once the sun drops below the horizon.
    if (-sun.direction.y < 0.0) {
        shadow = 0.0;
    }

    let base = object.color.rgb * tint;
    let lit = base * (sun_color * shadow + point_color + vec3<f32>(sun.ambient));
    return vec4<f32>(lit, object.color.a);
}
"#;

pub const CULL_SHADER: &str = r#"
const TILE_SIZE: u32 = 16u;
const MAX_LIGHTS_PER_TILE: u32 = 1024u;
const THREADS_PER_TILE: u32 = 256u;

struct CullParams {
    view: mat4x4<f32>,
    proj_scale: vec2<f32>,
    near: f32,
    far: f32,
    screen_size: vec2<u32>,
    tiles_x: u32,
    light_count: u32,
}

struct PointLight {
    color: vec3<f32>,
    intensity: f32,
    position: vec3<f32>,
    radius: f32,
}

@group(0) @binding(0)
var<uniform> params: CullParams;
@group(0) @binding(1)
var depth_texture: texture_depth_2d;
@group(0) @binding(2)
var<storage, read> lights: array<PointLight>;
@group(0) @binding(3)
var<storage, read_write> visible: array<i32>;

var<workgroup> min_depth_bits: atomic<u32>;
var<workgroup> max_depth_bits: atomic<u32>;
var<workgroup> hits: array<u32, 1024>;

fn linearize(depth: f32) -> f32 {
    return params.near * params.far / (params.far - depth * (params.far - params.near));
}

struct TileBounds {
    x0: f32,
    x1: f32,
    y0: f32,
    y1: f32,
    min_depth: f32,
    max_depth: f32,
}

fn intersects(center: vec3<f32>, radius: f32, tile: TileBounds) -> bool {
    let distance = -center.z;
    if (distance + radius < tile.min_depth || distance - radius > tile.max_depth) {
        return false;
    }
    let s = params.proj_scale;
    if (dot(normalize(vec3<f32>(s.x, 0.0, tile.x0)), center) < -radius) {
        return false;
    }
    if (dot(normalize(vec3<f32>(-s.x, 0.0, -tile.x1)), center) < -radius) {
        return false;
    }
    if (dot(normalize(vec3<f32>(0.0, s.y, tile.y0)), center) < -radius) {
        return false;
    }
    if (dot(normalize(vec3<f32>(0.0, -s.y, -tile.y1)), center) < -radius) {
        return false;
    }
    return true;
}

@compute @workgroup_size(16, 16)
fn cs_main(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_index) local_index: u32,
    @builtin(workgroup_id) tile_id: vec3<u32>,
) {
    if (local_index == 0u) {
        atomicStore(&min_depth_bits, 0x7f7fffffu);
        atomicStore(&max_depth_bits, 0u);
    }
    workgroupBarrier();

    if (global_id.x < params.screen_size.x && global_id.y < params.screen_size.y) {
        let depth = textureLoad(depth_texture, vec2<i32>(global_id.xy), 0);
        // Positive floats order the same as their bit patterns.
        let bits = bitcast<u32>(linearize(depth));
        atomicMin(&min_depth_bits, bits);
        atomicMax(&max_depth_bits, bits);
    }
    workgroupBarrier();

    let first_pixel = tile_id.xy * TILE_SIZE;
    let last_pixel = min(first_pixel + vec2<u32>(TILE_SIZE), params.screen_size);
    let screen = vec2<f32>(params.screen_size);
    var tile: TileBounds;
    tile.x0 = 2.0 * f32(first_pixel.x) / screen.x - 1.0;
    tile.x1 = 2.0 * f32(last_pixel.x) / screen.x - 1.0;
    tile.y0 = 1.0 - 2.0 * f32(last_pixel.y) / screen.y;
    tile.y1 = 1.0 - 2.0 * f32(first_pixel.y) / screen.y;
    tile.min_depth = bitcast<f32>(atomicLoad(&min_depth_bits));
    tile.max_depth = bitcast<f32>(atomicLoad(&max_depth_bits));

    for (var i = local_index; i < MAX_LIGHTS_PER_TILE; i += THREADS_PER_TILE) {
        var hit = 0u;
        if (i < params.light_count) {
            let light = lights[i];
            let center = (params.view * vec4<f32>(light.position, 1.0)).xyz;
            if (intersects(center, light.radius, tile)) {
                hit = 1u;
            }
        }
        hits[i] = hit;
    }
    workgroupBarrier();

    if (local_index == 0u) {
        let base = (tile_id.y * params.tiles_x + tile_id.x) * MAX_LIGHTS_PER_TILE;
        var count = 0u;
        for (var i = 0u; i < MAX_LIGHTS_PER_TILE; i++) {
            if (hits[i] != 0u) {
                visible[base + count] = i32(i);
                count++;
            }
        }
        if (count < MAX_LIGHTS_PER_TILE) {
            visible[base + count] = -1;
        }
    }
}
"#;

pub const LINE_SHADER: &str = r#"
struct DepthView {
    view_proj: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: DepthView;

struct LineOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) color: vec3<f32>) -> LineOutput {
    var out: LineOutput;
    out.clip = camera.view_proj * vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(input: LineOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(input.color, 1.0);
}
"#;

pub const PREVIEW_SHADER: &str = r#"
struct Preview {
    layer: u32,
    resolution: u32,
    _padding: vec2<u32>,
}

@group(0) @binding(0)
var<uniform> preview: Preview;
@group(0) @binding(1)
var shadow_map: texture_depth_2d_array;

struct PreviewOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

// Single triangle covering the viewport.
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> PreviewOutput {
    var out: PreviewOutput;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.clip = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(input: PreviewOutput) -> @location(0) vec4<f32> {
    let size = f32(preview.resolution);
    let texel = vec2<i32>(clamp(input.uv, vec2<f32>(0.0), vec2<f32>(0.9999)) * size);
    let depth = textureLoad(shadow_map, texel, i32(preview.layer), 0);
    return vec4<f32>(vec3<f32>(depth), 1.0);
}
"#;

pub const SKY_SHADER: &str = r#"
const PI: f32 = 3.14159265;
const PRIMARY_STEPS: i32 = 16;
const LIGHT_STEPS: i32 = 8;
// Distances in meters, eye one kilometer above the surface.
const PLANET_RADIUS: f32 = 6371e3;
const ATMOSPHERE_RADIUS: f32 = 6471e3;
const EYE: vec3<f32> = vec3<f32>(0.0, 6372e3, 0.0);
const SUN_INTENSITY: f32 = 22.0;
const RAYLEIGH_COEFFICIENT: vec3<f32> = vec3<f32>(5.5e-6, 13.0e-6, 22.4e-6);
const MIE_COEFFICIENT: f32 = 21e-6;
const RAYLEIGH_HEIGHT: f32 = 8e3;
const MIE_HEIGHT: f32 = 1.2e3;
const MIE_ANISOTROPY: f32 = 0.758;

struct Sky {
    inverse_view_proj: mat4x4<f32>,
}

struct Sun {
    color: vec3<f32>,
    brightness: f32,
    direction: vec3<f32>,
    ambient: f32,
}

@group(0) @binding(0)
var<uniform> sky: Sky;
@group(0) @binding(1)
var<uniform> sun: Sun;

struct SkyOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> SkyOutput {
    var out: SkyOutput;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.ndc = vec2<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    out.clip = vec4<f32>(out.ndc, 1.0, 1.0);
    return out;
}

// Entry and exit distances along a ray through a sphere at the origin.
// No hit when x > y.
fn ray_sphere(origin: vec3<f32>, dir: vec3<f32>, radius: f32) -> vec2<f32> {
    let a = dot(dir, dir);
    let b = 2.0 * dot(dir, origin);
    let c = dot(origin, origin) - radius * radius;
    let d = b * b - 4.0 * a * c;
    if (d < 0.0) {
        return vec2<f32>(1e5, -1e5);
    }
    let root = sqrt(d);
    return vec2<f32>((-b - root) / (2.0 * a), (-b + root) / (2.0 * a));
}

// Single-scattering Rayleigh and Mie ray march.
fn scatter(ray: vec3<f32>, to_sun: vec3<f32>) -> vec3<f32> {
    let span = ray_sphere(EYE, ray, ATMOSPHERE_RADIUS);
    if (span.x > span.y) {
        return vec3<f32>(0.0);
    }
    let start = max(span.x, 0.0);
    var end = span.y;
    let ground = ray_sphere(EYE, ray, PLANET_RADIUS);
    if (ground.x <= ground.y && ground.x > 0.0) {
        end = min(end, ground.x);
    }
    let stride = (end - start) / f32(PRIMARY_STEPS);

    let mu = dot(ray, to_sun);
    let mu2 = mu * mu;
    let g2 = MIE_ANISOTROPY * MIE_ANISOTROPY;
    let rayleigh_phase = 3.0 / (16.0 * PI) * (1.0 + mu2);
    let mie_phase = 3.0 / (8.0 * PI) * ((1.0 - g2) * (mu2 + 1.0))
        / (pow(1.0 + g2 - 2.0 * mu * MIE_ANISOTROPY, 1.5) * (2.0 + g2));

    var rayleigh = vec3<f32>(0.0);
    var mie = vec3<f32>(0.0);
    var depth_rayleigh = 0.0;
    var depth_mie = 0.0;

    for (var i = 0; i < PRIMARY_STEPS; i++) {
        let pos = EYE + ray * (start + stride * (f32(i) + 0.5));
        let height = length(pos) - PLANET_RADIUS;
        let step_rayleigh = exp(-height / RAYLEIGH_HEIGHT) * stride;
        let step_mie = exp(-height / MIE_HEIGHT) * stride;
        depth_rayleigh += step_rayleigh;
        depth_mie += step_mie;

        let light_step = ray_sphere(pos, to_sun, ATMOSPHERE_RADIUS).y / f32(LIGHT_STEPS);
        var light_rayleigh = 0.0;
        var light_mie = 0.0;
        for (var j = 0; j < LIGHT_STEPS; j++) {
            let light_pos = pos + to_sun * (light_step * (f32(j) + 0.5));
            let light_height = length(light_pos) - PLANET_RADIUS;
            light_rayleigh += exp(-light_height / RAYLEIGH_HEIGHT) * light_step;
            light_mie += exp(-light_height / MIE_HEIGHT) * light_step;
        }

        let attenuation = exp(-(MIE_COEFFICIENT * (depth_mie + light_mie)
            + RAYLEIGH_COEFFICIENT * (depth_rayleigh + light_rayleigh)));
        rayleigh += step_rayleigh * attenuation;
        mie += step_mie * attenuation;
    }

    return SUN_INTENSITY * (rayleigh_phase * RAYLEIGH_COEFFICIENT * rayleigh
        + mie_phase * MIE_COEFFICIENT * mie);
}

@fragment
fn fs_main(input: SkyOutput) -> @location(0) vec4<f32> {
    let far = sky.inverse_view_proj * vec4<f32>(input.ndc, 1.0, 1.0);
    let ray = normalize(far.xyz / far.w);
    let color = scatter(ray, -normalize(sun.direction)) * sun.color;
    // Exposure.
    return vec4<f32>(1.0 - exp(-color), 1.0);
}
"#;
