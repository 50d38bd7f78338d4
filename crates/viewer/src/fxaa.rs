//! FXAA pass configuration and shader source surgery.
//!
//! The anti-aliasing shader ships with a built-in quality preset. When the
//! caller picks a different one, the single `#define FXAA_QUALITY_PRESET`
//! line is rewritten before the module ever reaches the compiler; without a
//! preset the default source is used byte-for-byte. The substitution happens
//! exactly once, at composer construction.
//!
//! FXAA does not cope well with transparent backgrounds: the luminance
//! estimate reads garbage where alpha is zero. Hosts enabling it should
//! construct the viewer with an opaque background.

use std::borrow::Cow;
use std::fmt;

/// Discrete quality/performance trade-off codes understood by the shader.
///
/// - 10..=15: default dither (10 fastest, 15 highest quality)
/// - 20..=29: less dither, more expensive (20 fastest, 29 highest quality)
/// - 39: no dither, very expensive
///
/// The lowest digit tracks performance, the highest digit tracks style.
/// 12 is the built-in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxaaQualityPreset {
    Q10,
    Q11,
    Q12,
    Q13,
    Q14,
    Q15,
    Q20,
    Q21,
    Q22,
    Q23,
    Q24,
    Q25,
    Q26,
    Q27,
    Q28,
    Q29,
    Q39,
}

impl FxaaQualityPreset {
    pub const ALL: [FxaaQualityPreset; 17] = [
        Self::Q10,
        Self::Q11,
        Self::Q12,
        Self::Q13,
        Self::Q14,
        Self::Q15,
        Self::Q20,
        Self::Q21,
        Self::Q22,
        Self::Q23,
        Self::Q24,
        Self::Q25,
        Self::Q26,
        Self::Q27,
        Self::Q28,
        Self::Q29,
        Self::Q39,
    ];

    /// The numeric code spliced into the shader.
    pub fn code(self) -> u32 {
        match self {
            Self::Q10 => 10,
            Self::Q11 => 11,
            Self::Q12 => 12,
            Self::Q13 => 13,
            Self::Q14 => 14,
            Self::Q15 => 15,
            Self::Q20 => 20,
            Self::Q21 => 21,
            Self::Q22 => 22,
            Self::Q23 => 23,
            Self::Q24 => 24,
            Self::Q25 => 25,
            Self::Q26 => 26,
            Self::Q27 => 27,
            Self::Q28 => 28,
            Self::Q29 => 29,
            Self::Q39 => 39,
        }
    }

    /// Parses a numeric code from the enumerated set.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|preset| preset.code() == code)
    }
}

impl fmt::Display for FxaaQualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Post-processing options accepted at viewer construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FxaaOptions {
    /// Quality preset; `None` keeps the built-in default shader unmodified.
    pub quality_preset: Option<FxaaQualityPreset>,
}

/// Per-axis texel size for the FXAA resolution uniform.
pub fn texel_resolution(width: u32, height: u32, pixel_ratio: f32) -> [f32; 2] {
    [
        1.0 / (width.max(1) as f32 * pixel_ratio),
        1.0 / (height.max(1) as f32 * pixel_ratio),
    ]
}

/// Returns the fragment source with the preset spliced in, or the default
/// source untouched.
pub fn fragment_source(preset: Option<FxaaQualityPreset>) -> Cow<'static, str> {
    match preset {
        None => Cow::Borrowed(FXAA_FRAGMENT_GLSL),
        Some(preset) => Cow::Owned(substitute_preset(FXAA_FRAGMENT_GLSL, preset)),
    }
}

/// Rewrites the one `#define FXAA_QUALITY_PRESET` line.
fn substitute_preset(source: &str, preset: FxaaQualityPreset) -> String {
    let mut lines = Vec::new();
    for line in source.lines() {
        if line.trim_start().starts_with("#define FXAA_QUALITY_PRESET ") {
            lines.push(format!("#define FXAA_QUALITY_PRESET {}", preset.code()));
        } else {
            lines.push(line.to_string());
        }
    }
    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    rewritten
}

/// Compact FXAA 3.11-style edge smoothing.
///
/// Samples the resolved scene texture, estimates local luminance contrast,
/// walks the detected edge, and blends across it. The preset controls the
/// number of edge-search steps and the sub-pixel dither strength.
pub const FXAA_FRAGMENT_GLSL: &str = r"#version 450

#define FXAA_QUALITY_PRESET 12

#if FXAA_QUALITY_PRESET >= 39
    #define FXAA_SEARCH_STEPS 12
    #define FXAA_SUBPIX 0.00
#elif FXAA_QUALITY_PRESET >= 20
    #define FXAA_SEARCH_STEPS 8
    #define FXAA_SUBPIX 0.50
#else
    #define FXAA_SEARCH_STEPS 6
    #define FXAA_SUBPIX 0.75
#endif

#define FXAA_EDGE_THRESHOLD 0.125
#define FXAA_EDGE_THRESHOLD_MIN 0.0312

layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(set = 0, binding = 0) uniform texture2D sceneTexture;
layout(set = 0, binding = 1) uniform sampler sceneSampler;
layout(std140, set = 0, binding = 2) uniform FxaaParams {
    vec2 resolution; // 1 / (dimension * pixelRatio) per axis
} params;

float luma(vec3 rgb) {
    return dot(rgb, vec3(0.299, 0.587, 0.114));
}

vec3 sampleScene(vec2 uv) {
    return texture(sampler2D(sceneTexture, sceneSampler), uv).rgb;
}

void main() {
    vec2 texel = params.resolution;

    vec3 rgbM = sampleScene(v_uv);
    float lumaM = luma(rgbM);
    float lumaN = luma(sampleScene(v_uv + vec2(0.0, -texel.y)));
    float lumaS = luma(sampleScene(v_uv + vec2(0.0, texel.y)));
    float lumaW = luma(sampleScene(v_uv + vec2(-texel.x, 0.0)));
    float lumaE = luma(sampleScene(v_uv + vec2(texel.x, 0.0)));

    float lumaMin = min(lumaM, min(min(lumaN, lumaS), min(lumaW, lumaE)));
    float lumaMax = max(lumaM, max(max(lumaN, lumaS), max(lumaW, lumaE)));
    float range = lumaMax - lumaMin;

    if (range < max(FXAA_EDGE_THRESHOLD_MIN, lumaMax * FXAA_EDGE_THRESHOLD)) {
        outColor = vec4(rgbM, 1.0);
        return;
    }

    bool horizontal = abs(lumaN + lumaS - 2.0 * lumaM) >= abs(lumaW + lumaE - 2.0 * lumaM);
    vec2 crossStep = horizontal ? vec2(0.0, texel.y) : vec2(texel.x, 0.0);
    float lumaNeg = horizontal ? lumaN : lumaW;
    float lumaPos = horizontal ? lumaS : lumaE;
    float gradientNeg = abs(lumaNeg - lumaM);
    float gradientPos = abs(lumaPos - lumaM);
    if (gradientNeg < gradientPos) {
        crossStep = -crossStep;
    }
    float lumaEdge = 0.5 * (lumaM + (gradientNeg < gradientPos ? lumaPos : lumaNeg));
    float gradientScaled = 0.25 * max(gradientNeg, gradientPos);

    // Walk along the edge in both directions until contrast falls off.
    vec2 along = horizontal ? vec2(texel.x, 0.0) : vec2(0.0, texel.y);
    vec2 uvEdge = v_uv + crossStep * 0.5;
    float distNeg = 0.0;
    float distPos = 0.0;
    bool doneNeg = false;
    bool donePos = false;
    for (int i = 0; i < FXAA_SEARCH_STEPS; i++) {
        if (!doneNeg) {
            distNeg += 1.0;
            float l = luma(sampleScene(uvEdge - along * distNeg));
            doneNeg = abs(l - lumaEdge) >= gradientScaled;
        }
        if (!donePos) {
            distPos += 1.0;
            float l = luma(sampleScene(uvEdge + along * distPos));
            donePos = abs(l - lumaEdge) >= gradientScaled;
        }
        if (doneNeg && donePos) {
            break;
        }
    }

    float edgeLength = distNeg + distPos;
    float pixelOffset = max(0.0, 0.5 - min(distNeg, distPos) / max(edgeLength, 1.0));

    // Sub-pixel blend from the low-pass neighbourhood contrast.
    float lumaAvg = 0.25 * (lumaN + lumaS + lumaW + lumaE);
    float subpix = clamp(abs(lumaAvg - lumaM) / range, 0.0, 1.0);
    subpix = smoothstep(0.0, 1.0, subpix);
    pixelOffset = max(pixelOffset, subpix * subpix * FXAA_SUBPIX);

    outColor = vec4(sampleScene(v_uv + crossStep * pixelOffset), 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_source_is_untouched() {
        let source = fragment_source(None);
        assert_eq!(source.as_ref(), FXAA_FRAGMENT_GLSL);
        assert!(matches!(source, Cow::Borrowed(_)));
    }

    #[test]
    fn preset_rewrites_exactly_one_line() {
        let source = fragment_source(Some(FxaaQualityPreset::Q29));
        let changed: Vec<(&str, &str)> = FXAA_FRAGMENT_GLSL
            .lines()
            .zip(source.lines())
            .filter(|(before, after)| before != after)
            .collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].0, "#define FXAA_QUALITY_PRESET 12");
        assert_eq!(changed[0].1, "#define FXAA_QUALITY_PRESET 29");
    }

    #[test]
    fn every_code_round_trips() {
        for preset in FxaaQualityPreset::ALL {
            assert_eq!(FxaaQualityPreset::from_code(preset.code()), Some(preset));
        }
        assert_eq!(FxaaQualityPreset::from_code(16), None);
        assert_eq!(FxaaQualityPreset::from_code(30), None);
    }

    #[test]
    fn texel_resolution_tracks_pixel_ratio() {
        let [x, y] = texel_resolution(600, 300, 2.0);
        assert!((x - 1.0 / 1200.0).abs() < f32::EPSILON);
        assert!((y - 1.0 / 600.0).abs() < f32::EPSILON);
    }
}
