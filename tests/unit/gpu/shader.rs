use super::*;

#[test]
fn no_filter_reflection_has_expected_interface() {
    let reflection = reflect_program(&ShaderSource::no_filter()).unwrap();
    assert_eq!(reflection.attrib_location("position"), Some(0));
    assert_eq!(reflection.attrib_location("inputTextureCoordinate"), Some(1));
    assert_eq!(reflection.uniform_location("inputImageTexture"), Some(0));
    assert_eq!(reflection.uniform_location("brightness"), None);
}

#[test]
fn uniform_locations_follow_declaration_order() {
    let reflection =
        reflect_program(&ShaderSource::with_fragment(BRIGHTNESS_FRAGMENT_SHADER)).unwrap();
    assert_eq!(reflection.uniform_location("inputImageTexture"), Some(0));
    assert_eq!(reflection.uniform_location("brightness"), Some(1));
}

#[test]
fn stage_without_main_fails_to_compile() {
    let source = ShaderSource::with_fragment("uniform sampler2D inputImageTexture;");
    let err = reflect_program(&source).unwrap_err();
    assert!(matches!(err, KinettaError::ShaderCompile(_)));
}

#[test]
fn unknown_declared_type_fails_to_compile() {
    let source = ShaderSource::with_fragment(
        "uniform sampler3D volume;\nvoid main()\n{\n    gl_FragColor = vec4(0.0);\n}\n",
    );
    assert!(reflect_program(&source).is_err());
}

#[test]
fn fragment_varying_without_vertex_counterpart_fails_to_link() {
    let source = ShaderSource::with_fragment(
        "varying highp vec2 missingCoordinate;\n\
         uniform sampler2D inputImageTexture;\n\
         void main()\n{\n    gl_FragColor = texture2D(inputImageTexture, missingCoordinate);\n}\n",
    );
    let err = reflect_program(&source).unwrap_err();
    assert!(matches!(err, KinettaError::ShaderCompile(_)));
}

#[test]
fn fragment_attribute_fails_to_compile() {
    let source = ShaderSource::with_fragment(
        "attribute vec4 position;\nvoid main()\n{\n    gl_FragColor = vec4(0.0);\n}\n",
    );
    assert!(reflect_program(&source).is_err());
}

#[test]
fn precision_qualifiers_are_skipped() {
    let reflection =
        reflect_program(&ShaderSource::with_fragment(CONTRAST_FRAGMENT_SHADER)).unwrap();
    let contrast = reflection
        .uniforms
        .iter()
        .find(|d| d.name == "contrast")
        .unwrap();
    assert_eq!(contrast.ty, GlslType::Float);
}

#[test]
fn builtin_fragment_shaders_all_reflect() {
    for fragment in [
        NO_FILTER_FRAGMENT_SHADER,
        GRAYSCALE_FRAGMENT_SHADER,
        BRIGHTNESS_FRAGMENT_SHADER,
        CONTRAST_FRAGMENT_SHADER,
        INVERT_FRAGMENT_SHADER,
    ] {
        reflect_program(&ShaderSource::with_fragment(fragment)).unwrap();
    }
}
