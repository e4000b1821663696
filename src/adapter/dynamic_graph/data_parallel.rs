use std::sync::Arc;

use super::tape::Tape;
use crate::distributed::Collective;
use crate::engine::{Emitter, VarId};
use crate::errors::Result;
use crate::nn::Gradients;

/// 动态图数据并行：反向前把损失除以进程数，反向后对梯度求和，
/// 合起来等价于各进程梯度的平均
pub(crate) struct DataParallel {
    collective: Arc<dyn Collective>,
}

impl DataParallel {
    pub fn new(collective: Arc<dyn Collective>) -> Self {
        Self { collective }
    }

    pub fn nranks(&self) -> usize {
        self.collective.nranks()
    }

    pub fn scale_loss(&self, tape: &mut Tape<'_>, loss: VarId) -> Result<VarId> {
        tape.scale(loss, 1. / self.nranks() as f32)
    }

    pub fn apply_collective_grads(&self, grads: Gradients) -> Result<Gradients> {
        grads
            .into_iter()
            .map(|(name, grad)| Ok((name, self.collective.all_reduce_sum(&grad)?)))
            .collect()
    }
}
