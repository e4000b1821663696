use std::path::PathBuf;

use crate::checkpoint::{StateDict, StateValue, load_state, optimizer_path, params_path, save_state};
use crate::errors::HapiError;
use crate::tensor::Tensor;

fn temp_prefix(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("hapi_core_codec_{name}_{}", std::process::id()))
}

#[test]
fn test_artifact_paths() {
    let prefix = PathBuf::from("ckpt/epoch.1");
    assert_eq!(params_path(&prefix), PathBuf::from("ckpt/epoch.1.pdparams"));
    assert_eq!(optimizer_path(&prefix), PathBuf::from("ckpt/epoch.1.pdopt"));
}

#[test]
fn test_save_load_state_is_bit_exact() {
    let path = params_path(&temp_prefix("roundtrip"));
    let mut state = StateDict::new();
    state.insert(
        "fc_0.w_0".to_string(),
        StateValue::Tensor(Tensor::new(&[0.1, -0.2, 1e-30, 3.5], &[2, 2])),
    );
    state.insert("@LR_DECAY_COUNTER@".to_string(), StateValue::Int(41));
    state.insert("learning_rate_0".to_string(), StateValue::Float(0.01));

    save_state(&path, &state).expect("保存失败");
    let loaded = load_state(&path).expect("加载失败").expect("文件应存在");
    assert_eq!(loaded, state);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_load_missing_file_returns_none() {
    let path = params_path(&temp_prefix("missing"));
    assert!(load_state(&path).unwrap().is_none());
}

#[test]
fn test_load_rejects_foreign_file() {
    let path = temp_prefix("foreign");
    std::fs::write(&path, b"definitely not a checkpoint").unwrap();
    assert!(matches!(load_state(&path), Err(HapiError::Checkpoint(_))));
    std::fs::remove_file(&path).ok();
}
