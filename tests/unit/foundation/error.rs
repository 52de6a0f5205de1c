use super::*;

#[test]
fn helpers_build_the_matching_variants() {
    assert!(matches!(
        KinettaError::shader("bad"),
        KinettaError::ShaderCompile(_)
    ));
    assert!(matches!(
        KinettaError::codec("bad"),
        KinettaError::CodecConfig(_)
    ));
    assert!(matches!(KinettaError::muxer("bad"), KinettaError::MuxerIo(_)));
    assert!(matches!(
        KinettaError::validation("bad"),
        KinettaError::Validation(_)
    ));
    assert!(matches!(
        KinettaError::evaluation("bad"),
        KinettaError::Evaluation(_)
    ));
}

#[test]
fn display_carries_the_message() {
    let err = KinettaError::shader("uniform mismatch");
    assert_eq!(err.to_string(), "shader error: uniform mismatch");
}

#[test]
fn anyhow_converts_transparently() {
    fn fails() -> KinettaResult<()> {
        Err(anyhow::anyhow!("io exploded"))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(matches!(err, KinettaError::Other(_)));
    assert_eq!(err.to_string(), "io exploded");
}
