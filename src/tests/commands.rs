use crate::preprocess::PreprocessOption;
use crate::{apply_top_k, resolve_models, resolve_options};

use super::fixtures::setup;

#[test]
fn test_resolve_options_defaults_to_all() {
    assert_eq!(
        resolve_options(&[]).unwrap(),
        PreprocessOption::ALL.to_vec()
    );
}

#[test]
fn test_resolve_options_sorts_and_dedups() {
    assert_eq!(
        resolve_options(&[4, 1, 4, 0]).unwrap(),
        vec![
            PreprocessOption::None,
            PreprocessOption::Lemmatize,
            PreprocessOption::StopwordsStem,
        ]
    );
    assert!(resolve_options(&[2, 9]).is_err());
}

#[test]
fn test_resolve_models() {
    let (config, _dir) = setup();

    let all = resolve_models(&config, &[]).unwrap();
    assert_eq!(all, config.models);

    let picked = resolve_models(
        &config,
        &["MiniLM".to_string(), "minilm".to_string(), "bert".to_string()],
    )
    .unwrap();
    let names: Vec<&str> = picked.iter().map(|m| m.model_name.as_str()).collect();
    assert_eq!(names, vec!["MiniLM", "BERT"]);
}

#[test]
fn test_resolve_unknown_model() {
    let (config, _dir) = setup();
    let err = resolve_models(&config, &["gpt".to_string()]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("unknown model 'gpt'"), "{message}");
    assert!(message.contains("minilm"), "{message}");
}

#[test]
fn test_apply_top_k() {
    let (mut config, _dir) = setup();
    assert_eq!(config.top_k, 10);

    apply_top_k(&mut config, None).unwrap();
    assert_eq!(config.top_k, 10);

    apply_top_k(&mut config, Some(3)).unwrap();
    assert_eq!(config.top_k, 3);

    assert!(apply_top_k(&mut config, Some(0)).is_err());
    assert_eq!(config.top_k, 3);
}
