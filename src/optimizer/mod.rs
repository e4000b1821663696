/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : 优化器。具体算法只提供逐参数的更新规则，累积量的创建、命名、
 *                 学习率计数以及 state_dict/set_dict 由`OptimizerCore`统一管理
 */

mod adam;
mod collective;
mod core;
mod lr;
mod momentum;
mod sgd;

pub use self::core::{Accumulator, AccumulatorSpec, OptimizerCore, UpdateRule, unique_name};
pub use adam::Adam;
pub use collective::CollectiveOptimizer;
pub use lr::LearningRate;
pub use momentum::Momentum;
pub use sgd::Sgd;

use crate::checkpoint::StateDict;
use crate::errors::Result;
use crate::nn::{Gradients, ParameterStore};

#[cfg(test)]
mod tests;

/// 优化器 trait
///
/// 适配层只依赖`minimize`、`state_dict`、`set_dict`以及`core()`里的命名信息
/// （检查点转换需要它来推断动态图下的变量名）。
pub trait Optimizer {
    fn core(&self) -> &OptimizerCore;

    fn core_mut(&mut self) -> &mut OptimizerCore;

    /// 用给定梯度更新已绑定的参数
    fn minimize(&mut self, params: &mut ParameterStore, grads: &Gradients) -> Result<()>;

    fn state_dict(&self) -> StateDict {
        self.core().state_dict()
    }

    fn set_dict(&mut self, state: &StateDict) -> Result<()> {
        self.core_mut().set_dict(state)
    }

    fn learning_rate(&self) -> f32 {
        self.core().current_learning_rate()
    }
}
