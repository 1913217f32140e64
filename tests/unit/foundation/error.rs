use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        CardError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(CardError::trap("x").to_string().contains("guest trap:"));
    assert!(CardError::guest("x").to_string().contains("rasterizer error:"));
    assert!(CardError::marshal("x").to_string().contains("marshal error:"));
    let json_err = serde_json::from_str::<u32>("x").unwrap_err();
    let err = CardError::from(json_err);
    assert_eq!(err.kind(), "serde");
    assert!(err.to_string().contains("serialization error:"));
}

#[test]
fn lifecycle_errors_have_fixed_messages() {
    assert_eq!(
        CardError::NotInitialized.to_string(),
        "render module not initialized"
    );
    assert_eq!(
        CardError::AlreadyInitialized.to_string(),
        "render module already initialized"
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = CardError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), "other");
}

#[test]
fn serde_json_errors_convert() {
    let err: CardError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert_eq!(err.kind(), "serde");
}
