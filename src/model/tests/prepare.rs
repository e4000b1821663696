use std::collections::HashMap;
use std::sync::Arc;

use super::linear_model;
use crate::adapter::{GraphKind, Mode, dygraph_guard};
use crate::distributed::{LoopbackFactory, ParallelContext, ParallelEnv};
use crate::engine::Device;
use crate::errors::HapiError;
use crate::model::{Model, PrepareOptions};
use crate::nn::{Accuracy, CrossEntropy, Input, InputSpec, Linear, MeanSquaredError, Mlp};
use crate::optimizer::Sgd;

fn local() -> Arc<ParallelContext> {
    Arc::new(ParallelContext::local())
}

#[test]
fn test_model_new_follows_ambient_flag() {
    let model = Model::new(Linear::new("fc", 3, 1)).unwrap();
    assert_eq!(model.graph_kind(), GraphKind::Static);
    // 静态图的参数要等到启动程序执行时才初始化
    assert!(model.parameters().iter().all(|p| !p.is_initialized()));

    let _guard = dygraph_guard();
    let model = Model::new(Linear::new("fc", 3, 1)).unwrap();
    assert_eq!(model.graph_kind(), GraphKind::Dynamic);
    assert!(model.parameters().iter().all(|p| p.is_initialized()));
}

#[test]
fn test_static_prepare_requires_inputs() {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Static, local()).unwrap();
    let err = model
        .prepare(PrepareOptions::new().optimizer(Sgd::new(0.1)))
        .unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_static_loss_requires_labels() {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Static, local()).unwrap();
    let err = model
        .prepare(
            PrepareOptions::new()
                .loss(MeanSquaredError::default())
                .inputs(Input::batched("x", &[3])),
        )
        .unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_labels_must_be_a_list() {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Dynamic, local()).unwrap();
    let labels = InputSpec::Map(HashMap::from([("y".to_string(), Input::batched("y", &[1]))]));
    let err = model.prepare(PrepareOptions::new().labels(labels)).unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_dynamic_prepare_without_inputs() {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Dynamic, local()).unwrap();
    model
        .prepare(PrepareOptions::new().optimizer(Sgd::new(0.1)).loss(MeanSquaredError::default()))
        .unwrap();
    assert_eq!(model.device(), Some(Device::Cpu));
    assert!(model.optimizer().is_some());
}

#[test]
fn test_input_map_is_ordered_by_forward_arguments() {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Static, local()).unwrap();
    let inputs = InputSpec::Map(HashMap::from([("x".to_string(), Input::batched("image", &[3]))]));
    model.prepare(PrepareOptions::new().inputs(inputs)).unwrap();

    let missing = InputSpec::Map(HashMap::from([("z".to_string(), Input::batched("z", &[3]))]));
    let err = model.prepare(PrepareOptions::new().inputs(missing)).unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_invalid_device_is_rejected() {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), GraphKind::Dynamic, local()).unwrap();
    let err = model.prepare(PrepareOptions::new().device("npu")).unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_gpu_prepare_initializes_distributed_context() {
    let context = Arc::new(ParallelContext::new(ParallelEnv::new(2, 0), Box::new(LoopbackFactory)));
    let mut model = Model::with_kind(Mlp::new(&[2, 3]).unwrap(), GraphKind::Dynamic, context.clone()).unwrap();
    assert!(!context.is_initialized());
    model.prepare(PrepareOptions::new().device("gpu")).unwrap();
    assert!(context.is_initialized());
    assert_eq!(model.device(), Some(Device::Gpu(0)));
}

#[test]
fn test_cpu_multi_rank_is_not_ready() {
    let context = Arc::new(ParallelContext::new(ParallelEnv::new(2, 0), Box::new(LoopbackFactory)));
    let mut model = Model::with_kind(Mlp::new(&[2, 3]).unwrap(), GraphKind::Dynamic, context).unwrap();
    let err = model.prepare(PrepareOptions::new().device("cpu")).unwrap_err();
    assert!(matches!(err, HapiError::NotReady(_)));
}

#[test]
fn test_metrics_name_starts_with_loss() {
    let mut model = Model::with_kind(Mlp::new(&[2, 3]).unwrap(), GraphKind::Dynamic, local()).unwrap();
    model
        .prepare(
            PrepareOptions::new()
                .loss(CrossEntropy::default())
                .metric(Accuracy::new(&[1, 2]).unwrap()),
        )
        .unwrap();
    assert_eq!(model.metrics_name(), vec!["loss", "acc_top1", "acc_top2"]);
}

#[test]
fn test_mode_follows_last_call() {
    let mut model = linear_model(GraphKind::Static, Sgd::new(0.1));
    let (x, y) = super::regression_data(2);
    model.train_batch(&[x.clone()], &[y.clone()]).unwrap();
    assert_eq!(model.mode(), Mode::Train);
    model.eval_batch(&[x.clone()], &[y]).unwrap();
    assert_eq!(model.mode(), Mode::Eval);
    model.test_batch(&[x]).unwrap();
    assert_eq!(model.mode(), Mode::Test);
}
