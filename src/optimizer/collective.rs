use std::sync::Arc;

use super::{Optimizer, OptimizerCore};
use crate::distributed::Collective;
use crate::errors::Result;
use crate::nn::{Gradients, ParameterStore};

/// 数据并行下的优化器包装：先对梯度做 all-reduce 并按进程数取平均，再交给内部优化器。
/// 命名、累积量与状态字典都沿用内部优化器的
pub struct CollectiveOptimizer {
    inner: Box<dyn Optimizer>,
    collective: Arc<dyn Collective>,
}

impl CollectiveOptimizer {
    pub fn new(inner: Box<dyn Optimizer>, collective: Arc<dyn Collective>) -> Self {
        Self { inner, collective }
    }
}

impl Optimizer for CollectiveOptimizer {
    fn core(&self) -> &OptimizerCore {
        self.inner.core()
    }

    fn core_mut(&mut self) -> &mut OptimizerCore {
        self.inner.core_mut()
    }

    fn minimize(&mut self, params: &mut ParameterStore, grads: &Gradients) -> Result<()> {
        let nranks = self.collective.nranks() as f32;
        let mut averaged = Gradients::new();
        for (name, grad) in grads {
            let summed = self.collective.all_reduce_sum(grad)?;
            averaged.insert(name.clone(), summed / nranks);
        }
        self.inner.minimize(params, &averaged)
    }
}
