/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : Adam 优化器，偏差修正通过两个标量累积量（beta 的幂）完成：
 *                 lr_t = lr * sqrt(1 - beta2^t) / (1 - beta1^t)
 *                 m = beta1 * m + (1 - beta1) * g
 *                 v = beta2 * v + (1 - beta2) * g^2
 *                 p -= lr_t * m / (sqrt(v) + epsilon)
 */

use super::{Accumulator, AccumulatorSpec, LearningRate, Optimizer, OptimizerCore, UpdateRule};
use crate::errors::{HapiError, Result};
use crate::nn::{Gradients, ParameterStore};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy)]
struct AdamRule {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl UpdateRule for AdamRule {
    fn update(&self, param: &mut Tensor, grad: &Tensor, lr: f32, slots: &mut [Accumulator]) -> Result<()> {
        let count = slots.len();
        let [m, v, beta1_pow, beta2_pow] = slots else {
            return Err(HapiError::NotReady(format!(
                "Adam 需要4个累积量，但得到{count}个"
            )));
        };
        let b1p = beta1_pow.value.number().unwrap_or(self.beta1);
        let b2p = beta2_pow.value.number().unwrap_or(self.beta2);
        let lr_t = lr * (1. - b2p).sqrt() / (1. - b1p);

        m.value = &m.value * self.beta1 + &(grad * (1. - self.beta1));
        v.value = &v.value * self.beta2 + &(&(grad * grad) * (1. - self.beta2));
        let denom = v.value.sqrt() + self.epsilon;
        *param -= &(&(&m.value / &denom) * lr_t);

        beta1_pow.value *= self.beta1;
        beta2_pow.value *= self.beta2;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    core: OptimizerCore,
    rule: AdamRule,
}

impl Adam {
    pub fn new(lr: impl Into<LearningRate>) -> Self {
        Self::build(None, lr.into())
    }

    pub fn named(name: &str, lr: impl Into<LearningRate>) -> Self {
        Self::build(Some(name), lr.into())
    }

    fn build(name: Option<&str>, lr: LearningRate) -> Self {
        let rule = AdamRule {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        };
        Self {
            core: OptimizerCore::new("Adam", name, lr, Self::specs(&rule)),
            rule,
        }
    }

    fn specs(rule: &AdamRule) -> Vec<AccumulatorSpec> {
        vec![
            AccumulatorSpec::like_param("moment1"),
            AccumulatorSpec::like_param("moment2"),
            AccumulatorSpec::scalar("beta1_pow_acc", rule.beta1),
            AccumulatorSpec::scalar("beta2_pow_acc", rule.beta2),
        ]
    }

    /// 只能在绑定参数（prepare）之前调整，累积量的初始值随之改变
    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.rule.beta1 = beta1;
        self.rule.beta2 = beta2;
        let specs = Self::specs(&self.rule);
        self.core.set_specs(specs);
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.rule.epsilon = epsilon;
        self
    }
}

impl Optimizer for Adam {
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
