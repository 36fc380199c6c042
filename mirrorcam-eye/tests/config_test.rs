//! Loading configuration files

use mirrorcam_eye::capture::SelectionRule;
use mirrorcam_eye::processing::CropSpace;
use mirrorcam_eye::{MirrorcamConfig, VisionError};
use mirrorcam_llm::Provider;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[model]
name = "yolov8n_clothes"

[crop]
space = "frame"

[analysis]
provider = "openai"
url = "https://api.openai.com/v1"
"#,
    );

    let config = MirrorcamConfig::from_file(file.path()).unwrap();
    assert_eq!(config.model.name, "yolov8n_clothes");
    assert!(config.model.warm_up);
    assert_eq!(config.crop.space, CropSpace::Frame);
    assert_eq!(config.crop.confidence_threshold, 0.85);
    assert_eq!(config.analysis.provider, Provider::OpenAI);
    assert_eq!(config.analysis.max_tokens, 1000);
    assert_eq!(config.nms.iou_threshold, 0.45);
    assert!(config.validate().is_ok());
}

#[test]
fn test_preset_replaces_policy() {
    let file = write_config(
        r#"
preset = "immediate"

[policy]
window_ms = 9000
"#,
    );

    let config = MirrorcamConfig::from_file(file.path()).unwrap();
    assert_eq!(config.policy.window_ms, 0);
    assert_eq!(config.policy.selection_rule, SelectionRule::FirstSeen);
}

#[test]
fn test_custom_policy() {
    let file = write_config(
        r#"
[policy]
trigger_threshold = 0.6
display_threshold = 0.8
window_ms = 3000
selection_rule = "first_seen"
dedup_cell = 32.0
max_candidates = 5

[frame_loop]
fps = 15
max_frames = 300
"#,
    );

    let config = MirrorcamConfig::from_file(file.path()).unwrap();
    assert_eq!(config.policy.crop_threshold(), 0.6);
    assert_eq!(config.policy.max_candidates, 5);
    assert_eq!(config.frame_loop.fps, 15);
    assert_eq!(config.frame_loop.max_frames, Some(300));
}

#[test]
fn test_invalid_toml() {
    let file = write_config("[model\nname = ");
    assert!(matches!(
        MirrorcamConfig::from_file(file.path()),
        Err(VisionError::ConfigParse(_))
    ));
}

#[test]
fn test_out_of_range_rejected_on_load() {
    let file = write_config("[frame_loop]\nfps = 500\n");
    assert!(matches!(
        MirrorcamConfig::load(Some(file.path())),
        Err(VisionError::Config(_))
    ));
}

#[test]
fn test_missing_file() {
    let result = MirrorcamConfig::from_file(std::path::Path::new("/nonexistent/mirrorcam.toml"));
    assert!(matches!(result, Err(VisionError::Config(_))));
}

#[test]
fn test_round_trip_through_toml() {
    let config = MirrorcamConfig::default();
    let rendered = toml::to_string(&config).unwrap();
    let file = write_config(&rendered);
    assert_eq!(MirrorcamConfig::from_file(file.path()).unwrap(), config);
}
