/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : 动量法：
 *                 v = momentum * v + g
 *                 p -= lr * v                      （普通）
 *                 p -= lr * (g + momentum * v)     （nesterov）
 */

use super::{Accumulator, AccumulatorSpec, LearningRate, Optimizer, OptimizerCore, UpdateRule};
use crate::errors::{HapiError, Result};
use crate::nn::{Gradients, ParameterStore};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy)]
struct MomentumRule {
    momentum: f32,
    nesterov: bool,
}

impl UpdateRule for MomentumRule {
    fn update(&self, param: &mut Tensor, grad: &Tensor, lr: f32, slots: &mut [Accumulator]) -> Result<()> {
        let count = slots.len();
        let [velocity] = slots else {
            return Err(HapiError::NotReady(format!(
                "Momentum 需要1个累积量，但得到{count}个"
            )));
        };
        velocity.value = &velocity.value * self.momentum + grad;
        let step = if self.nesterov {
            (grad + &(&velocity.value * self.momentum)) * lr
        } else {
            &velocity.value * lr
        };
        *param -= &step;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Momentum {
    core: OptimizerCore,
    rule: MomentumRule,
}

impl Momentum {
    pub fn new(lr: impl Into<LearningRate>, momentum: f32) -> Self {
        Self::build(None, lr.into(), momentum)
    }

    /// 带名字的优化器：静态图下累积量名为`{参数名}_{name}_velocity_{n}`
    pub fn named(name: &str, lr: impl Into<LearningRate>, momentum: f32) -> Self {
        Self::build(Some(name), lr.into(), momentum)
    }

    fn build(name: Option<&str>, lr: LearningRate, momentum: f32) -> Self {
        Self {
            core: OptimizerCore::new(
                "Momentum",
                name,
                lr,
                vec![AccumulatorSpec::like_param("velocity")],
            ),
            rule: MomentumRule {
                momentum,
                nesterov: false,
            },
        }
    }

    pub fn with_nesterov(mut self, nesterov: bool) -> Self {
        self.rule.nesterov = nesterov;
        self
    }

    pub fn momentum(&self) -> f32 {
        self.rule.momentum
    }
}

impl Optimizer for Momentum {
    fn core(&self) -> &OptimizerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OptimizerCore {
        &mut self.core
    }

    fn minimize(&mut self, params: &mut ParameterStore, grads: &Gradients) -> Result<()> {
        self.core.apply_update(&self.rule, params, grads)
    }
}
