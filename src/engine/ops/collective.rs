use super::{Kernel, KernelContext, no_grad};
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

/// 沿批维度汇集所有进程的张量；只出现在 eval/test 中，不参与反向传播
#[derive(Debug, Clone, PartialEq)]
pub struct AllGather {
    pub nranks: usize,
}

impl Kernel for AllGather {
    fn name(&self) -> &'static str {
        "c_allgather"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        let collective = ctx.collective.ok_or_else(|| {
            HapiError::NotReady("分布式上下文尚未初始化，无法执行 all-gather".to_string())
        })?;
        if collective.nranks() != self.nranks {
            return Err(HapiError::InvalidArgument(format!(
                "all-gather 期望{}个进程，但通信上下文中有{}个",
                self.nranks,
                collective.nranks()
            )));
        }
        collective.all_gather(inputs[0])
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        _grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        no_grad(inputs)
    }
}
