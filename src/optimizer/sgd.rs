use super::{Accumulator, LearningRate, Optimizer, OptimizerCore, UpdateRule};
use crate::errors::Result;
use crate::nn::{Gradients, ParameterStore};
use crate::tensor::Tensor;

/// 随机梯度下降：`p -= lr * g`，没有累积量
#[derive(Debug, Clone, Copy)]
struct SgdRule;

impl UpdateRule for SgdRule {
    fn update(&self, param: &mut Tensor, grad: &Tensor, lr: f32, _slots: &mut [Accumulator]) -> Result<()> {
        *param -= &(grad * lr);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    core: OptimizerCore,
}

impl Sgd {
    pub fn new(lr: impl Into<LearningRate>) -> Self {
        Self {
            core: OptimizerCore::new("SGD", None, lr.into(), Vec::new()),
        }
    }

    pub fn named(name: &str, lr: impl Into<LearningRate>) -> Self {
        Self {
            core: OptimizerCore::new("SGD", Some(name), lr.into(), Vec::new()),
        }
    }
}

impl Optimizer for Sgd {
    fn core(&self) -> &OptimizerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OptimizerCore {
        &mut self.core
    }

    fn minimize(&mut self, params: &mut ParameterStore, grads: &Gradients) -> Result<()> {
        self.core.apply_update(&SgdRule, params, grads)
    }
}
