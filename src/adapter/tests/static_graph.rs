use approx::assert_abs_diff_eq;

use super::{batch, linear_state, loopback_context};
use crate::adapter::{GraphAdapter, Mode, StaticGraphAdapter};
use crate::engine::Device;
use crate::errors::HapiError;
use crate::nn::{Accuracy, CrossEntropy, Input, Mlp};
use crate::optimizer::{LearningRate, Momentum, Sgd};
use crate::tensor::Tensor;

#[test]
fn test_prepare_builds_three_programs() {
    let lr = LearningRate::piecewise(&[10], &[0.1, 0.01]).unwrap();
    let mut state = linear_state(Some(Box::new(Momentum::new(lr, 0.9))));
    let mut adapter = StaticGraphAdapter::new();
    assert!(!adapter.is_prepared());
    adapter.prepare(&mut state).unwrap();

    assert!(adapter.is_prepared());
    assert!(adapter.has_prepended_ops(Mode::Train));
    assert!(!adapter.has_prepended_ops(Mode::Eval));
    assert!(!adapter.has_prepended_ops(Mode::Test));
    assert_eq!(adapter.is_test_program(Mode::Train), Some(false));
    assert_eq!(adapter.is_test_program(Mode::Eval), Some(true));
    assert_eq!(adapter.is_test_program(Mode::Test), Some(true));
    // 训练：matmul, add, 平方误差, 均值, 求和；测试只有前向两个
    assert_eq!(adapter.op_count(Mode::Train), Some(5));
    assert_eq!(adapter.op_count(Mode::Eval), Some(4));
    assert_eq!(adapter.op_count(Mode::Test), Some(2));
}

#[test]
fn test_startup_runs_once() {
    let mut state = linear_state(Some(Box::new(Sgd::new(0.1))));
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();
    assert!(state.params.iter().all(|p| p.is_initialized()));
    let w = state.params.value("fc.w_0").unwrap().clone();

    adapter.prepare(&mut state).unwrap();
    assert_eq!(adapter.startup_runs(), 1);
    assert_eq!(state.params.value("fc.w_0").unwrap(), &w);
}

#[test]
fn test_prepare_again_moves_executor_to_new_device() {
    let mut state = linear_state(Some(Box::new(Sgd::new(0.1))));
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();
    assert_eq!(adapter.device(), Some(Device::Cpu));

    state.device = Some(Device::Gpu(0));
    adapter.prepare(&mut state).unwrap();
    assert_eq!(adapter.device(), Some(Device::Gpu(0)));
    assert_eq!(adapter.startup_runs(), 1);
}

#[test]
fn test_train_updates_parameters_and_mode() {
    let mut state = linear_state(Some(Box::new(Sgd::new(0.1))));
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();
    let before = state.params.value("fc.w_0").unwrap().clone();

    let (x, y) = batch();
    let out = adapter.train(&mut state, &[x.clone()], &[y.clone()]).unwrap();
    assert_eq!(adapter.mode(), Mode::Train);
    assert_eq!(out.losses.len(), 1);
    assert!(out.losses[0].is_finite());
    assert_ne!(state.params.value("fc.w_0").unwrap(), &before);

    adapter.eval(&mut state, &[x.clone()], &[y]).unwrap();
    assert_eq!(adapter.mode(), Mode::Eval);
    let outputs = adapter.test(&mut state, &[x]).unwrap();
    assert_eq!(adapter.mode(), Mode::Test);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].shape(), &[2, 1]);
}

#[test]
fn test_eval_does_not_touch_parameters() {
    let mut state = linear_state(Some(Box::new(Sgd::new(0.1))));
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();
    let before = state.params.value("fc.w_0").unwrap().clone();
    let (x, y) = batch();
    let out = adapter.eval(&mut state, &[x], &[y]).unwrap();
    assert_eq!(out.losses.len(), 1);
    assert_eq!(state.params.value("fc.w_0").unwrap(), &before);
}

#[test]
fn test_train_without_optimizer_is_not_ready() {
    let mut state = linear_state(None);
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();
    let (x, y) = batch();
    assert!(matches!(
        adapter.train(&mut state, &[x], &[y]),
        Err(HapiError::NotReady(_))
    ));
}

#[test]
fn test_run_before_prepare_is_not_ready() {
    let mut state = linear_state(Some(Box::new(Sgd::new(0.1))));
    let mut adapter = StaticGraphAdapter::new();
    let (x, _) = batch();
    assert!(matches!(
        adapter.test(&mut state, &[x]),
        Err(HapiError::NotReady(_))
    ));
}

#[test]
fn test_feed_shape_is_checked() {
    let mut state = linear_state(Some(Box::new(Sgd::new(0.1))));
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();
    let bad = Tensor::zeros(&[2, 4]);
    assert!(matches!(
        adapter.test(&mut state, &[bad]),
        Err(HapiError::InvalidArgument(_))
    ));
}

#[test]
fn test_distributed_eval_trims_padding() {
    let mut state = crate::adapter::ModelState::new(
        Box::new(Mlp::new(&[2, 3]).unwrap()),
        loopback_context(2),
        5,
    )
    .unwrap();
    state.loss = Some(Box::new(CrossEntropy::default()));
    state.metrics = vec![Box::new(Accuracy::default())];
    state.inputs = vec![Input::batched("x", &[2])];
    state.labels = vec![Input::batched("label", &[1])];
    state.eval_data_size = Some(10);
    let mut adapter = StaticGraphAdapter::new();
    adapter.prepare(&mut state).unwrap();

    let x = Tensor::new(&[0.5, -1., 2., 0.25], &[2, 2]);
    let label = Tensor::new(&[0., 2.], &[2, 1]);
    // 每个进程每批2个样本，汇总后为4个；第三批只剩2个真实样本
    for expected in [4, 4, 2] {
        adapter
            .eval(&mut state, &[x.clone()], &[label.clone()])
            .unwrap();
        assert_eq!(adapter.merge_count().effective_batch(Mode::Eval), expected);
    }
    assert_eq!(adapter.merge_count().eval_total, 0);
    let acc = state.metrics[0].accumulate();
    assert_eq!(acc.len(), 1);
    assert!((0. ..=1.).contains(&acc[0]));

    let outputs = adapter.test(&mut state, &[x]).unwrap();
    assert_eq!(outputs[0].shape(), &[4, 3]);
}

#[test]
fn test_static_training_is_deterministic() {
    let run = || {
        let mut state = linear_state(Some(Box::new(Momentum::new(0.1, 0.9))));
        let mut adapter = StaticGraphAdapter::new();
        adapter.prepare(&mut state).unwrap();
        let (x, y) = batch();
        let out = adapter.train(&mut state, &[x], &[y]).unwrap();
        (out.losses[0].clone(), state.params.value("fc.w_0").unwrap().clone())
    };
    let (loss_a, w_a) = run();
    let (loss_b, w_b) = run();
    assert_abs_diff_eq!(loss_a, loss_b);
    assert_abs_diff_eq!(w_a, w_b);
}
