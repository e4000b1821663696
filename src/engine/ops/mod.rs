/*
 * @Author       : 老董
 * @Date         : 2026-02-04
 * @Description  : 参考 CPU 内核集合。适配层只通过`ExecutionHandle::dispatch`调用它们，
 *                 静态图与动态图记录的是同一组算子
 */

mod activation;
mod collective;
mod linear;
mod loss;
mod metric;

pub use activation::{Dropout, Relu, Sigmoid, Tanh};
pub use collective::AllGather;
pub use linear::{Add, MatMul, Scale, SumN};
pub use loss::{ReduceMean, ReduceSum, SoftmaxCrossEntropy, SquaredError};
pub use metric::TopkCorrect;

use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;

use crate::distributed::Collective;
use crate::errors::{Result, TensorError};
use crate::tensor::Tensor;

#[enum_dispatch]
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    MatMul(MatMul),
    Add(Add),
    Scale(Scale),
    SumN(SumN),
    Relu(Relu),
    Tanh(Tanh),
    Sigmoid(Sigmoid),
    Dropout(Dropout),
    SquaredError(SquaredError),
    SoftmaxCrossEntropy(SoftmaxCrossEntropy),
    ReduceMean(ReduceMean),
    ReduceSum(ReduceSum),
    TopkCorrect(TopkCorrect),
    AllGather(AllGather),
}

/// 内核执行时的上下文
pub struct KernelContext<'a> {
    /// 推理模式（关闭dropout等训练期行为）
    pub is_test: bool,
    pub rng: &'a mut StdRng,
    pub collective: Option<&'a dyn Collective>,
    /// 内核可在此留下反向传播需要的中间量
    pub saved: Option<Tensor>,
}

#[enum_dispatch(Op)]
pub trait Kernel {
    fn name(&self) -> &'static str;

    /// 输入个数；`None`表示可变
    fn arity(&self) -> Option<usize>;

    fn forward(&self, inputs: &[&Tensor], ctx: &mut KernelContext<'_>) -> Result<Tensor>;

    /// 给定输出的梯度，计算每个输入的梯度（不可导的输入返回`None`）
    fn backward(
        &self,
        inputs: &[&Tensor],
        output: &Tensor,
        grad: &Tensor,
        saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>>;

    fn check_arity(&self, got: usize) -> Result<()> {
        match self.arity() {
            Some(expected) if expected != got => Err(TensorError::ArityMismatch {
                op: self.name(),
                expected,
                got,
            }
            .into()),
            _ => Ok(()),
        }
    }
}

/// 不可导算子的反向结果
fn no_grad(inputs: &[&Tensor]) -> Result<Vec<Option<Tensor>>> {
    Ok(vec![None; inputs.len()])
}
