mod static_graph;

use std::sync::Arc;

use crate::adapter::ModelState;
use crate::distributed::{LoopbackFactory, ParallelContext, ParallelEnv};
use crate::engine::Device;
use crate::nn::{Input, Linear, MeanSquaredError};
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;

/// `fc`（3 -> 1）+ 均方误差，已声明输入与标签
fn linear_state(optimizer: Option<Box<dyn Optimizer>>) -> ModelState {
    let mut state = ModelState::new(
        Box::new(Linear::new("fc", 3, 1)),
        Arc::new(ParallelContext::local()),
        11,
    )
    .unwrap();
    state.optimizer = optimizer;
    state.loss = Some(Box::new(MeanSquaredError::default()));
    state.inputs = vec![Input::batched("x", &[3])];
    state.labels = vec![Input::batched("y", &[1])];
    state
}

/// 两个进程（进程内模拟）的上下文，已初始化集合通信
fn loopback_context(nranks: usize) -> Arc<ParallelContext> {
    let context = ParallelContext::new(ParallelEnv::new(nranks, 0), Box::new(LoopbackFactory));
    context.ensure_initialized(Device::Gpu(0)).unwrap();
    Arc::new(context)
}

fn batch() -> (Tensor, Tensor) {
    (
        Tensor::new(&[1., 2., 3., -1., 0.5, 2.], &[2, 3]),
        Tensor::new(&[1., -1.], &[2, 1]),
    )
}
