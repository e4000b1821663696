use super::{Kernel, KernelContext};
use crate::errors::Result;
use crate::tensor::Tensor;

/// 矩阵乘：[x(N, in), w(in, out)] -> (N, out)
#[derive(Debug, Clone, PartialEq)]
pub struct MatMul;

impl Kernel for MatMul {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(inputs[0].mat_mul(inputs[1])?)
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        let grad_x = grad.mat_mul(&inputs[1].transpose()?)?;
        let grad_w = inputs[0].transpose()?.mat_mul(grad)?;
        Ok(vec![Some(grad_x), Some(grad_w)])
    }
}

/// 带广播的逐元素加法（也用作加偏置）
#[derive(Debug, Clone, PartialEq)]
pub struct Add;

impl Kernel for Add {
    fn name(&self) -> &'static str {
        "elementwise_add"
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Tensor::broadcast_shape("加", inputs[0].shape(), inputs[1].shape())?;
        Ok(inputs[0] + inputs[1])
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![
            Some(grad.sum_to_shape(inputs[0].shape())?),
            Some(grad.sum_to_shape(inputs[1].shape())?),
        ])
    }
}

/// 乘以常数
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    pub factor: f32,
}

impl Kernel for Scale {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(inputs[0] * self.factor)
    }

    fn backward(
        &self,
        _inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad * self.factor)])
    }
}

/// 同形状张量求和（用于把多个损失项合并为一个标量）
#[derive(Debug, Clone, PartialEq)]
pub struct SumN;

impl Kernel for SumN {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn arity(&self) -> Option<usize> {
        None
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        let (first, rest) = inputs
            .split_first()
            .ok_or(crate::errors::TensorError::EmptyList)?;
        let mut total = (*first).clone();
        for t in rest {
            if t.shape() != total.shape() {
                return Err(crate::errors::TensorError::IncompatibleShapes {
                    operator: "求和",
                    lhs: total.shape().to_vec(),
                    rhs: t.shape().to_vec(),
                }
                .into());
            }
            total += t;
        }
        Ok(total)
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        Ok(inputs.iter().map(|_| Some(grad.clone())).collect())
    }
}
