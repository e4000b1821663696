use approx::assert_abs_diff_eq;

use crate::distributed::{Collective, LoopbackCollective};
use crate::engine::ops::{
    Add, AllGather, Dropout, Kernel, MatMul, SoftmaxCrossEntropy, SumN, TopkCorrect,
};
use crate::engine::{Device, ExecutionHandle, Op};
use crate::errors::{HapiError, TensorError};
use crate::tensor::Tensor;

#[test]
fn test_dispatch_counts_and_checks_arity() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 0);
    let a = Tensor::new(&[1., 2.], &[1, 2]);
    let w = Tensor::new(&[1., 0., 0., 1.], &[2, 2]);
    let (out, saved) = handle
        .dispatch(&Op::from(MatMul), &[&a, &w], false, None)
        .unwrap();
    assert_eq!(out, a);
    assert!(saved.is_none());
    assert_eq!(handle.dispatched(), 1);

    let err = handle.dispatch(&Op::from(MatMul), &[&a], false, None);
    assert!(matches!(
        err,
        Err(HapiError::Tensor(TensorError::ArityMismatch { expected: 2, got: 1, .. }))
    ));
    assert_eq!(handle.dispatched(), 1);
}

#[test]
fn test_add_rejects_unbroadcastable_shapes() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 0);
    let a = Tensor::zeros(&[2, 3]);
    let b = Tensor::zeros(&[2]);
    assert!(handle.dispatch(&Op::from(Add), &[&a, &b], false, None).is_err());
}

#[test]
fn test_sum_n_of_many_inputs() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 0);
    let a = Tensor::scalar(1.5);
    let b = Tensor::scalar(2.);
    let c = Tensor::scalar(-0.5);
    let (out, _) = handle
        .dispatch(&Op::from(SumN), &[&a, &b, &c], false, None)
        .unwrap();
    assert_abs_diff_eq!(out.number().unwrap(), 3.0);
}

#[test]
fn test_dropout_is_identity_in_test_mode_and_saves_mask_in_train() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 7);
    let x = Tensor::full(&[4, 8], 1.);
    let op = Op::from(Dropout::new(0.5).unwrap());

    let (out, saved) = handle.dispatch(&op, &[&x], true, None).unwrap();
    assert_eq!(out, x);
    assert!(saved.is_none());

    let (out, saved) = handle.dispatch(&op, &[&x], false, None).unwrap();
    let mask = saved.expect("训练模式下应保存掩码");
    assert_eq!(out, mask);
    assert!(out.to_vec().iter().all(|&v| v == 0. || v == 2.));

    assert!(Dropout::new(1.0).is_err());
}

#[test]
fn test_softmax_cross_entropy_forward_and_backward() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 0);
    let logits = Tensor::new(&[0., 0., 1., 1.], &[2, 2]);
    let label = Tensor::new(&[0., 1.], &[2, 1]);
    let op = Op::from(SoftmaxCrossEntropy);
    let (loss, saved) = handle.dispatch(&op, &[&logits, &label], false, None).unwrap();
    assert_eq!(loss.shape(), &[2, 1]);
    let ln2 = 2f32.ln();
    assert_abs_diff_eq!(loss, Tensor::new(&[ln2, ln2], &[2, 1]), epsilon = 1e-6);

    let grad = Tensor::full(&[2, 1], 1.);
    let grads = op
        .backward(&[&logits, &label], &loss, &grad, saved.as_ref())
        .unwrap();
    let expected = Tensor::new(&[-0.5, 0.5, 0.5, -0.5], &[2, 2]);
    assert_abs_diff_eq!(grads[0].clone().unwrap(), expected, epsilon = 1e-6);
    assert!(grads[1].is_none());

    let bad_label = Tensor::new(&[0., 5.], &[2, 1]);
    assert!(handle.dispatch(&op, &[&logits, &bad_label], false, None).is_err());
}

#[test]
fn test_topk_correct() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 0);
    let pred = Tensor::new(&[0.1, 0.6, 0.3, 0.5, 0.2, 0.3], &[2, 3]);
    let label = Tensor::new(&[1., 2.], &[2, 1]);
    let (top1, _) = handle
        .dispatch(&Op::from(TopkCorrect { k: 1 }), &[&pred, &label], true, None)
        .unwrap();
    assert_eq!(top1.to_vec(), vec![1., 0.]);
    let (top2, _) = handle
        .dispatch(&Op::from(TopkCorrect { k: 2 }), &[&pred, &label], true, None)
        .unwrap();
    assert_eq!(top2.to_vec(), vec![1., 1.]);
}

#[test]
fn test_topk_correct_negative_label_is_a_miss() {
    let mut handle = ExecutionHandle::new(Device::Cpu, 0);
    // 第0类得分最高，负标签不能被当作第0类
    let pred = Tensor::new(&[0.9, 0.05, 0.05, 0.9, 0.05, 0.05], &[2, 3]);
    let label = Tensor::new(&[-1., 0.], &[2, 1]);
    let (top1, _) = handle
        .dispatch(&Op::from(TopkCorrect { k: 1 }), &[&pred, &label], true, None)
        .unwrap();
    assert_eq!(top1.to_vec(), vec![0., 1.]);
}

#[test]
fn test_all_gather_needs_collective() {
    let mut handle = ExecutionHandle::new(Device::Gpu(0), 0);
    let x = Tensor::new(&[1., 2.], &[2, 1]);
    let op = Op::from(AllGather { nranks: 2 });
    assert!(matches!(
        handle.dispatch(&op, &[&x], true, None),
        Err(HapiError::NotReady(_))
    ));

    let collective = LoopbackCollective::new(2);
    let (out, _) = handle
        .dispatch(&op, &[&x], true, Some(&collective as &dyn Collective))
        .unwrap();
    assert_eq!(out.shape(), &[4, 1]);
    assert_eq!(out.to_vec(), vec![1., 2., 1., 2.]);
}
