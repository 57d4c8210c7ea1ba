use super::*;

#[test]
fn test_default_config_validates() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_json_yields_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert!((config.engine.similarity_threshold - 0.8).abs() < f32::EPSILON);
    assert_eq!(config.engine.top_k, 5);
    assert_eq!(config.engine.cache_turns_per_user, 10);
    assert_eq!(config.persona.message_count, 3);
    assert_eq!(config.gateway.port, 8080);
    assert!(!config.embeddings.enabled);
}

#[test]
fn test_camel_case_keys() {
    let config: Config = serde_json::from_str(
        r#"{"engine":{"similarityThreshold":0.9,"topK":3,"rngSeed":7,"storeTimeoutMs":50}}"#,
    )
    .unwrap();
    assert!((config.engine.similarity_threshold - 0.9).abs() < f32::EPSILON);
    assert_eq!(config.engine.top_k, 3);
    assert_eq!(config.engine.rng_seed, Some(7));
    assert_eq!(config.engine.store_timeout(), Duration::from_millis(50));
}

#[test]
fn test_invalid_similarity_threshold() {
    let mut config = Config::default();
    config.engine.similarity_threshold = 0.0;
    assert!(config.validate().is_err());
    config.engine.similarity_threshold = 1.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_zero_top_k() {
    let mut config = Config::default();
    config.engine.top_k = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_context_window_must_reach_advanced_stage() {
    let mut config = Config::default();
    config.engine.context_window = 3;
    assert!(config.validate().is_err());
    config.engine.context_window = 4;
    assert!(config.validate().is_ok());
    config.engine.cache_turns_per_user = 2;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_suffix_probability() {
    let mut config = Config::default();
    config.engine.playful_suffix_probability = 1.2;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_zero_timeouts() {
    let mut config = Config::default();
    config.engine.store_timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_zero_threshold_persona() {
    let mut config = Config::default();
    config.persona.message_count = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_zero_port() {
    let mut config = Config::default();
    config.gateway.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_zero_dimensions() {
    let mut config = Config::default();
    config.embeddings.dimensions = 0;
    assert!(config.validate().is_err());
}
