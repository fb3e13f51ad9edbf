//! Shader-stage composition.
//!
//! The lit surface shader is a WGSL template carrying named marker comments.
//! A material extends it by supplying [`ShaderStage`]s: each stage names an
//! injection point, brings its own module-scope declarations and extra
//! varyings, and its body is spliced in at the marker. Composition is plain
//! text assembly validated up front, so a bad stage fails at pipeline build
//! with a [`ComposeError`] instead of a WGSL parse error deep in wgpu.

use thiserror::Error;

/// The lit surface template every composed material starts from.
pub const SURFACE_TEMPLATE: &str = include_str!("../shaders/surface.wgsl");

const DECLARATIONS_MARK: &str = "//#declarations";
const VARYINGS_MARK: &str = "//#varyings";

/// Where a stage body lands in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionPoint {
    /// Vertex stage, after the clip-space transform. `in` is the full vertex
    /// and `out` carries the standard varyings; extra varyings may be filled
    /// in here.
    PostTransform,
    /// Fragment stage, after lighting and dithering. `color` is the working
    /// `vec3f`; additive terms modify it and skip the lit tone path.
    PostDither,
}

impl InjectionPoint {
    fn marker(self) -> &'static str {
        match self {
            InjectionPoint::PostTransform => "//#post_transform",
            InjectionPoint::PostDither => "//#post_dither",
        }
    }

    fn label(self) -> &'static str {
        match self {
            InjectionPoint::PostTransform => "post_transform",
            InjectionPoint::PostDither => "post_dither",
        }
    }
}

/// One shader extension: code for a named point plus whatever module-scope
/// declarations and vertex-output fields it relies on.
///
/// Varying fields must end with a trailing comma and use locations 3 and up;
/// the template reserves 0..=2 for position, normal and uv.
#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub point: InjectionPoint,
    pub declarations: &'static str,
    pub varyings: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("shader template has no '{point}' marker")]
    MissingPoint { point: &'static str },
    #[error("shader template has {count} '{point}' markers, expected exactly one")]
    DuplicatePoint { point: &'static str, count: usize },
    #[error("stage for '{point}' has an empty body")]
    EmptyBody { point: &'static str },
    #[error("post_dither stage never touches `color`, the working fragment value")]
    UnusedColor,
}

/// Splices `stages` into `template` and strips the markers.
///
/// Stages sharing a point keep their slice order. Each body is wrapped in a
/// block so stage locals cannot collide across stages.
pub fn compose(template: &str, stages: &[ShaderStage]) -> Result<String, ComposeError> {
    let mut declarations = String::new();
    let mut varyings = String::new();
    let mut transform = String::new();
    let mut dither = String::new();

    for stage in stages {
        if stage.body.trim().is_empty() {
            return Err(ComposeError::EmptyBody {
                point: stage.point.label(),
            });
        }
        if stage.point == InjectionPoint::PostDither && !stage.body.contains("color") {
            return Err(ComposeError::UnusedColor);
        }
        if !stage.declarations.is_empty() {
            declarations.push_str(stage.declarations);
            declarations.push('\n');
        }
        if !stage.varyings.is_empty() {
            varyings.push_str(stage.varyings);
            varyings.push('\n');
        }
        let sink = match stage.point {
            InjectionPoint::PostTransform => &mut transform,
            InjectionPoint::PostDither => &mut dither,
        };
        sink.push_str("{\n");
        sink.push_str(stage.body);
        sink.push_str("\n}\n");
    }

    let mut out = replace_marker(template, DECLARATIONS_MARK, &declarations)?;
    out = replace_marker(&out, VARYINGS_MARK, &varyings)?;
    out = replace_marker(&out, InjectionPoint::PostTransform.marker(), &transform)?;
    out = replace_marker(&out, InjectionPoint::PostDither.marker(), &dither)?;
    Ok(out)
}

fn replace_marker(source: &str, marker: &'static str, content: &str) -> Result<String, ComposeError> {
    let point = marker.trim_start_matches("//#");
    match source.matches(marker).count() {
        0 => Err(ComposeError::MissingPoint { point }),
        1 => Ok(source.replacen(marker, content, 1)),
        count => Err(ComposeError::DuplicatePoint { point, count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
//#declarations
struct VsOut {
    @location(0) uv: vec2f,
    //#varyings
}
fn vs() {
    //#post_transform
}
fn fs() {
    var color = vec3f(0.0);
    //#post_dither
    return color;
}
";

    fn stage(point: InjectionPoint, body: &'static str) -> ShaderStage {
        ShaderStage {
            point,
            declarations: "",
            varyings: "",
            body,
        }
    }

    #[test]
    fn zero_stages_strip_every_marker() {
        let out = compose(TEMPLATE, &[]).unwrap();
        assert!(!out.contains("//#"), "markers survived: {out}");
    }

    #[test]
    fn the_shipped_template_carries_all_markers() {
        compose(SURFACE_TEMPLATE, &[]).expect("surface.wgsl must compose bare");
    }

    #[test]
    fn body_lands_at_its_marker() {
        let out = compose(TEMPLATE, &[stage(InjectionPoint::PostDither, "color += glow;")]).unwrap();
        let spliced = out.find("color += glow;").expect("body missing");
        let ret = out.find("return color;").unwrap();
        assert!(spliced < ret, "body must land before the return");
        assert!(out.find("var color").unwrap() < spliced);
    }

    #[test]
    fn stages_at_one_point_keep_their_order() {
        let out = compose(
            TEMPLATE,
            &[
                stage(InjectionPoint::PostDither, "color += first;"),
                stage(InjectionPoint::PostDither, "color += second;"),
            ],
        )
        .unwrap();
        assert!(out.find("first").unwrap() < out.find("second").unwrap());
    }

    #[test]
    fn declarations_and_varyings_are_spliced() {
        let out = compose(
            TEMPLATE,
            &[ShaderStage {
                point: InjectionPoint::PostTransform,
                declarations: "@group(2) @binding(0) var<uniform> knob: f32;",
                varyings: "@location(3) extra: vec2f,",
                body: "out.extra = in.uv;",
            }],
        )
        .unwrap();
        let decl = out.find("knob: f32").unwrap();
        let varying = out.find("@location(3) extra").unwrap();
        assert!(decl < out.find("struct VsOut").unwrap());
        assert!(varying < out.find("fn vs").unwrap());
    }

    #[test]
    fn missing_marker_is_rejected() {
        let err = compose("fn fs() {}", &[]).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::MissingPoint {
                point: "declarations"
            }
        ));
    }

    #[test]
    fn duplicate_marker_is_rejected() {
        let doubled = format!("{TEMPLATE}\n//#post_dither\n");
        let err = compose(&doubled, &[]).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::DuplicatePoint {
                point: "post_dither",
                count: 2
            }
        ));
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = compose(TEMPLATE, &[stage(InjectionPoint::PostTransform, "  \n")]).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::EmptyBody {
                point: "post_transform"
            }
        ));
    }

    #[test]
    fn post_dither_stage_must_touch_color() {
        let err = compose(TEMPLATE, &[stage(InjectionPoint::PostDither, "let x = 1.0;")]).unwrap_err();
        assert!(matches!(err, ComposeError::UnusedColor));
    }
}
