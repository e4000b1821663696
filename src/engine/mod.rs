/*
 * @Author       : 老董
 * @Date         : 2026-02-04
 * @Description  : 执行引擎：设备、执行句柄（算子派发）、变量编号以及两种执行模式
 *                 共用的算子记录接口（Emitter）与反向梯度扫描
 */

mod autograd;
mod emitter;
pub mod ops;

pub use autograd::{OpRecord, backward};
pub use emitter::Emitter;
pub use ops::{Kernel, KernelContext, Op};

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;

use crate::distributed::Collective;
use crate::errors::Result;
use crate::tensor::Tensor;

#[cfg(test)]
mod tests;

/// 图（或动态记录带）中变量的编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

impl VarId {
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var_{}", self.0)
    }
}

/// 运行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu(usize),
}

impl Device {
    pub const fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu(_))
    }

    /// 当前构建是否带有 GPU 运行时。参考内核只在主机上执行，故恒为 false
    pub const fn gpu_available() -> bool {
        false
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPUPlace"),
            Self::Gpu(id) => write!(f, "CUDAPlace({id})"),
        }
    }
}

/// 执行句柄：一个设备 + 能在其上创建张量、派发算子的运行时
///
/// 注：`Device::Gpu`只是逻辑上的放置，参考内核集合始终在主机上计算；
/// 放置信息影响的是分布式行为（如动态图推理时是否做all-gather）。
pub struct ExecutionHandle {
    device: Device,
    rng: StdRng,
    dispatched: usize,
}

impl ExecutionHandle {
    pub fn new(device: Device, seed: u64) -> Self {
        Self {
            device,
            rng: StdRng::seed_from_u64(seed),
            dispatched: 0,
        }
    }

    pub const fn device(&self) -> Device {
        self.device
    }

    /// 已派发的算子总数
    pub const fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// 派发一个算子，返回其输出以及反向传播需要保存的中间量（如dropout掩码）
    pub fn dispatch(
        &mut self,
        op: &Op,
        inputs: &[&Tensor],
        is_test: bool,
        collective: Option<&dyn Collective>,
    ) -> Result<(Tensor, Option<Tensor>)> {
        op.check_arity(inputs.len())?;
        let mut ctx = KernelContext {
            is_test,
            rng: &mut self.rng,
            collective,
            saved: None,
        };
        let output = op.forward(inputs, &mut ctx)?;
        let saved = ctx.saved.take();
        self.dispatched += 1;
        Ok((output, saved))
    }
}
