use crate::foundation::error::{KinettaError, KinettaResult};

/// Vertex shader shared by every built-in filter: pass the full-screen quad
/// through and forward texture coordinates.
pub const NO_FILTER_VERTEX_SHADER: &str = "\
attribute vec4 position;
attribute vec4 inputTextureCoordinate;

varying vec2 textureCoordinate;

void main()
{
    gl_Position = position;
    textureCoordinate = inputTextureCoordinate.xy;
}
";

/// Fragment shader that samples the input texture unchanged.
pub const NO_FILTER_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;

void main()
{
    gl_FragColor = texture2D(inputImageTexture, textureCoordinate);
}
";

/// Luminance-weighted grayscale.
pub const GRAYSCALE_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;

const highp vec3 W = vec3(0.2125, 0.7154, 0.0721);

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    highp float luminance = dot(textureColor.rgb, W);
    gl_FragColor = vec4(vec3(luminance), textureColor.a);
}
";

/// Additive brightness adjustment; `brightness` in `[-1, 1]`.
pub const BRIGHTNESS_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float brightness;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    gl_FragColor = vec4(textureColor.rgb + vec3(brightness), textureColor.a);
}
";

/// Contrast scale about mid-gray; `contrast` in `[0, 4]`, identity at 1.
pub const CONTRAST_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float contrast;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    gl_FragColor = vec4((textureColor.rgb - vec3(0.5)) * contrast + vec3(0.5), textureColor.a);
}
";

/// Channel inversion.
pub const INVERT_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    gl_FragColor = vec4(1.0 - textureColor.rgb, textureColor.a);
}
";

/// A vertex/fragment shader pair to be compiled and linked into a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    /// Vertex stage GLSL source.
    pub vertex: String,
    /// Fragment stage GLSL source.
    pub fragment: String,
}

impl ShaderSource {
    /// Pair an arbitrary fragment shader with the shared no-filter vertex
    /// shader.
    pub fn with_fragment(fragment: &str) -> Self {
        Self {
            vertex: NO_FILTER_VERTEX_SHADER.to_string(),
            fragment: fragment.to_string(),
        }
    }

    /// The passthrough no-filter program.
    pub fn no_filter() -> Self {
        Self::with_fragment(NO_FILTER_FRAGMENT_SHADER)
    }
}

/// Data type of a shader interface declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlslType {
    /// `float`
    Float,
    /// `int`
    Int,
    /// `vec2`
    Vec2,
    /// `vec3`
    Vec3,
    /// `vec4`
    Vec4,
    /// `mat3`
    Mat3,
    /// `mat4`
    Mat4,
    /// `sampler2D`
    Sampler2D,
}

impl GlslType {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "float" => Self::Float,
            "int" => Self::Int,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            _ => return None,
        })
    }
}

/// One `attribute`/`uniform`/`varying` declaration recovered from a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// Declared identifier.
    pub name: String,
    /// Declared type.
    pub ty: GlslType,
}

/// Interface reflection for a linked program.
///
/// Attribute and uniform locations are assigned in declaration order, which
/// is stable for a given source pair.
#[derive(Clone, Debug, Default)]
pub struct ProgramReflection {
    /// Vertex-stage attributes in declaration order.
    pub attributes: Vec<Declaration>,
    /// Uniforms from both stages in declaration order, deduplicated by name.
    pub uniforms: Vec<Declaration>,
}

impl ProgramReflection {
    /// Location of a vertex attribute, if declared.
    pub fn attrib_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .position(|d| d.name == name)
            .map(|i| i as u32)
    }

    /// Location of a uniform, if declared in either stage.
    pub fn uniform_location(&self, name: &str) -> Option<u32> {
        self.uniforms
            .iter()
            .position(|d| d.name == name)
            .map(|i| i as u32)
    }
}

/// Parse and cross-check a shader pair, producing its interface reflection.
///
/// This is the "compile and link" step of the software device. Failure modes
/// mirror a real GL toolchain: a stage without `main` fails to compile, an
/// unknown declared type fails to compile, and a fragment `varying` with no
/// vertex counterpart fails to link.
pub fn reflect_program(source: &ShaderSource) -> KinettaResult<ProgramReflection> {
    let vertex = parse_stage(&source.vertex, "vertex")?;
    let fragment = parse_stage(&source.fragment, "fragment")?;

    for varying in &fragment.varyings {
        if !vertex.varyings.iter().any(|v| v.name == varying.name) {
            return Err(KinettaError::shader(format!(
                "link failed: fragment varying '{}' has no vertex counterpart",
                varying.name
            )));
        }
    }
    if !fragment.attributes.is_empty() {
        return Err(KinettaError::shader(
            "fragment stage must not declare attributes",
        ));
    }

    let mut uniforms = vertex.uniforms;
    for u in fragment.uniforms {
        if !uniforms.iter().any(|existing| existing.name == u.name) {
            uniforms.push(u);
        }
    }

    Ok(ProgramReflection {
        attributes: vertex.attributes,
        uniforms,
    })
}

struct StageInterface {
    attributes: Vec<Declaration>,
    uniforms: Vec<Declaration>,
    varyings: Vec<Declaration>,
}

fn parse_stage(src: &str, stage: &str) -> KinettaResult<StageInterface> {
    if !src.contains("void main") {
        return Err(KinettaError::shader(format!(
            "{stage} shader has no main() entry point"
        )));
    }

    let mut attributes = Vec::new();
    let mut uniforms = Vec::new();
    let mut varyings = Vec::new();

    for statement in src.split(';') {
        let mut tokens = statement.split_whitespace().peekable();
        let storage = match tokens.next() {
            Some(s @ ("attribute" | "uniform" | "varying")) => s,
            _ => continue,
        };

        // Skip precision qualifiers (`lowp`, `mediump`, `highp`).
        let mut ty_token = tokens
            .next()
            .ok_or_else(|| KinettaError::shader(format!("{stage} shader: truncated {storage}")))?;
        if matches!(ty_token, "lowp" | "mediump" | "highp") {
            ty_token = tokens.next().ok_or_else(|| {
                KinettaError::shader(format!("{stage} shader: truncated {storage}"))
            })?;
        }
        let ty = GlslType::parse(ty_token).ok_or_else(|| {
            KinettaError::shader(format!("{stage} shader: unknown type '{ty_token}'"))
        })?;
        let name = tokens.next().ok_or_else(|| {
            KinettaError::shader(format!("{stage} shader: {storage} missing identifier"))
        })?;

        let decl = Declaration {
            name: name.to_string(),
            ty,
        };
        match storage {
            "attribute" => attributes.push(decl),
            "uniform" => uniforms.push(decl),
            "varying" => varyings.push(decl),
            _ => unreachable!(),
        }
    }

    Ok(StageInterface {
        attributes,
        uniforms,
        varyings,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/gpu/shader.rs"]
mod tests;
