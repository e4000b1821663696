use std::fs;
use std::sync::Arc;

use super::{linear_model, regression_data, temp_dir};
use crate::adapter::GraphKind;
use crate::checkpoint::{optimizer_path, params_path};
use crate::distributed::{LoopbackFactory, ParallelContext, ParallelEnv};
use crate::errors::HapiError;
use crate::model::{LoadReport, Model, PrepareOptions};
use crate::nn::{Input, Linear, MeanSquaredError};
use crate::optimizer::{Adam, Momentum};

#[test]
fn test_static_round_trip_with_adam() {
    let dir = temp_dir("adam_round_trip");
    let prefix = dir.join("ckpt");
    let mut model = linear_model(GraphKind::Static, Adam::new(0.01));
    let (x, y) = regression_data(4);
    model.train_batch(&[x], &[y]).unwrap();
    model.save(&prefix).unwrap();
    assert!(params_path(&prefix).exists());
    assert!(optimizer_path(&prefix).exists());

    let mut restored = linear_model(GraphKind::Static, Adam::new(0.01));
    let report = restored.load(&prefix, false, false).unwrap();
    assert_eq!(report, LoadReport::default());

    for param in model.parameters() {
        assert_eq!(restored.parameter(param.name()).unwrap().value(), param.value());
    }
    let saved = model.optimizer().unwrap().core();
    let loaded = restored.optimizer().unwrap().core();
    for name in saved.param_names() {
        let (a, b) = (saved.accumulators(&name).unwrap(), loaded.accumulators(&name).unwrap());
        assert_eq!(a.len(), 4);
        for (a, b) in a.iter().zip(b) {
            assert_eq!(a.var_name, b.var_name);
            assert_eq!(a.value, b.value);
        }
    }
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = temp_dir("nested_save");
    let prefix = dir.join("a").join("b").join("ckpt");
    let model = linear_model(GraphKind::Dynamic, Momentum::new(0.1, 0.9));
    model.save(&prefix).unwrap();
    assert!(params_path(&prefix).exists());
    // 还未训练，动量累积量尚未创建
    assert!(!optimizer_path(&prefix).exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_save_rejects_directory_path() {
    let dir = temp_dir("dir_path");
    let model = linear_model(GraphKind::Dynamic, Momentum::new(0.1, 0.9));
    let err = model.save(dir.join("sub/")).unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_save_is_noop_on_other_ranks() {
    let dir = temp_dir("rank1_save");
    let prefix = dir.join("ckpt");
    let context = ParallelContext::new(ParallelEnv::new(2, 1), Box::new(LoopbackFactory));
    let model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Static, Arc::new(context)).unwrap();
    model.save(&prefix).unwrap();
    assert!(!params_path(&prefix).exists());
}

#[test]
fn test_load_missing_checkpoint_fails() {
    let dir = temp_dir("missing");
    let mut model = linear_model(GraphKind::Dynamic, Momentum::new(0.1, 0.9));
    let err = model.load(dir.join("nothing"), false, false).unwrap_err();
    assert!(matches!(err, HapiError::Checkpoint(_)));
}

fn narrow_model() -> Model {
    let mut model = Model::with_kind(
        Linear::new("fc", 2, 1),
        GraphKind::Static,
        Arc::new(ParallelContext::local()),
    )
    .unwrap();
    model
        .prepare(
            PrepareOptions::new()
                .optimizer(Momentum::new(0.1, 0.9))
                .loss(MeanSquaredError::default())
                .inputs(Input::batched("x", &[2]))
                .labels(Input::batched("y", &[1])),
        )
        .unwrap();
    model
}

#[test]
fn test_shape_mismatch_fails_by_default() {
    let dir = temp_dir("mismatch");
    let prefix = dir.join("ckpt");
    let mut model = linear_model(GraphKind::Static, Momentum::new(0.1, 0.9));
    let (x, y) = regression_data(2);
    model.train_batch(&[x], &[y]).unwrap();
    model.save(&prefix).unwrap();

    let err = narrow_model().load(&prefix, false, false).unwrap_err();
    match err {
        HapiError::ParameterMismatch {
            key,
            expected,
            received,
        } => {
            assert_eq!(key, "fc.w_0");
            assert_eq!(expected, vec![2, 1]);
            assert_eq!(received, Some(vec![3, 1]));
        }
        other => panic!("期望 ParameterMismatch，但得到{other:?}"),
    }
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_skip_mismatch_forces_optimizer_reset() {
    let dir = temp_dir("skip_mismatch");
    let prefix = dir.join("ckpt");
    let mut model = linear_model(GraphKind::Static, Momentum::new(0.1, 0.9));
    let (x, y) = regression_data(2);
    model.train_batch(&[x], &[y]).unwrap();
    model.save(&prefix).unwrap();

    let mut narrow = narrow_model();
    let report = narrow.load(&prefix, true, false).unwrap();
    assert_eq!(report.skipped, vec!["fc.w_0".to_string()]);
    assert!(report.reset_optimizer);
    // 形状一致的偏置照常恢复
    assert_eq!(
        narrow.parameter("fc.b_0").unwrap().value(),
        model.parameter("fc.b_0").unwrap().value()
    );
    // 动量没有从检查点恢复
    let velocity = narrow.optimizer().unwrap().core().accumulators("fc.b_0").unwrap();
    assert!(velocity[0].value.to_vec().iter().all(|&v| v == 0.));
    fs::remove_dir_all(&dir).unwrap();
}
