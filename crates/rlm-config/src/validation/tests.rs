use super::*;

#[test]
fn default_config_is_valid() {
    assert!(validate(&RlmConfig::default()).is_ok());
}

#[test]
fn zero_max_steps_rejected() {
    let mut config = RlmConfig::default();
    config.engine.max_steps = 0;
    let err = validate(&config).unwrap_err();
    assert!(err.to_string().contains("engine.max_steps"));
}

#[test]
fn batch_concurrency_upper_bound() {
    let mut config = RlmConfig::default();
    config.sub_query.batch_concurrency = 64;
    assert!(validate(&config).is_ok());
    config.sub_query.batch_concurrency = 65;
    assert!(validate(&config).is_err());
}

#[test]
fn high_water_fraction_must_be_a_fraction() {
    let mut config = RlmConfig::default();
    config.sub_query.high_water_fraction = 1.5;
    assert!(validate(&config).is_err());
    config.sub_query.high_water_fraction = f64::NAN;
    assert!(validate(&config).is_err());
    config.sub_query.high_water_fraction = 0.0;
    assert!(validate(&config).is_ok());
}

#[test]
fn tiny_exec_timeout_rejected() {
    let mut config = RlmConfig::default();
    config.sandbox.exec_timeout_ms = 10;
    let err = validate(&config).unwrap_err();
    assert!(err.to_string().contains("sandbox.exec_timeout_ms = 10"));
}

#[test]
fn empty_model_name_rejected() {
    let mut config = RlmConfig::default();
    config.model.model = "  ".into();
    assert!(validate(&config).is_err());

    let mut config = RlmConfig::default();
    config.model.sub_query_model = Some(String::new());
    assert!(validate(&config).is_err());
}

#[test]
fn multiple_errors_are_joined() {
    let mut config = RlmConfig::default();
    config.engine.max_steps = 0;
    config.sub_query.max_calls = 0;
    config.model.temperature = 2.0;
    let msg = validate(&config).unwrap_err().to_string();
    assert!(msg.contains("engine.max_steps"));
    assert!(msg.contains("sub_query.max_calls"));
    assert!(msg.contains("model.temperature"));
    assert_eq!(msg.matches("; ").count(), 2);
}
