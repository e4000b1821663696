use ndarray::{Array2, Axis};

use super::{Kernel, KernelContext};
use crate::errors::{HapiError, Result, TensorError};
use crate::tensor::Tensor;

/// 逐元素平方误差：[pred, label] -> (pred - label)²
#[derive(Debug, Clone, PartialEq)]
pub struct SquaredError;

impl Kernel for SquaredError {
    fn name(&self) -> &'static str {
        "square_error_cost"
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        if inputs[0].shape() != inputs[1].shape() {
            return Err(TensorError::IncompatibleShapes {
                operator: "计算平方误差",
                lhs: inputs[0].shape().to_vec(),
                rhs: inputs[1].shape().to_vec(),
            }
            .into());
        }
        let diff = inputs[0] - inputs[1];
        Ok(&diff * &diff)
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        let diff = inputs[0] - inputs[1];
        Ok(vec![Some(&(grad * &diff) * 2.), None])
    }
}

/// softmax + 交叉熵：[logits(N, C), label(N, 1)] -> 每个样本的损失(N, 1)，
/// 标签为以浮点数存放的类别下标
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxCrossEntropy;

impl SoftmaxCrossEntropy {
    fn labels(label: &Tensor, rows: usize, classes: usize) -> Result<Vec<usize>> {
        if label.size() != rows {
            return Err(TensorError::IncompatibleShapes {
                operator: "计算交叉熵",
                lhs: vec![rows, classes],
                rhs: label.shape().to_vec(),
            }
            .into());
        }
        label
            .to_vec()
            .into_iter()
            .map(|v| {
                let idx = v.round();
                if idx < 0. || idx as usize >= classes {
                    Err(HapiError::InvalidArgument(format!(
                        "类别标签{v}超出范围[0, {classes})"
                    )))
                } else {
                    Ok(idx as usize)
                }
            })
            .collect()
    }
}

impl Kernel for SoftmaxCrossEntropy {
    fn name(&self) -> &'static str {
        "softmax_with_cross_entropy"
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn forward(&self, inputs: &[&Tensor], ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        let logits = inputs[0]
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|_| TensorError::RankMismatch {
                operator: "softmax",
                expected: 2,
                got: inputs[0].shape().to_vec(),
            })?;
        let (rows, classes) = logits.dim();
        let labels = Self::labels(inputs[1], rows, classes)?;

        let mut probs = Array2::<f32>::zeros((rows, classes));
        let mut losses = Vec::with_capacity(rows);
        for (r, row) in logits.axis_iter(Axis(0)).enumerate() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let exp = row.mapv(|v| (v - max).exp());
            let total = exp.sum();
            for (c, e) in exp.iter().enumerate() {
                probs[[r, c]] = e / total;
            }
            losses.push(-(probs[[r, labels[r]]].max(f32::MIN_POSITIVE)).ln());
        }
        ctx.saved = Some(Tensor::from_array(probs.into_dyn()));
        Ok(Tensor::try_new(losses, &[rows, 1])?)
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        let probs = saved.ok_or_else(|| {
            HapiError::NotReady("softmax_with_cross_entropy 缺少前向保存的概率".to_string())
        })?;
        let (rows, classes) = (probs.shape()[0], probs.shape()[1]);
        let labels = Self::labels(inputs[1], rows, classes)?;
        let mut onehot = vec![0.; rows * classes];
        for (r, &c) in labels.iter().enumerate() {
            onehot[r * classes + c] = 1.;
        }
        let onehot = Tensor::try_new(onehot, &[rows, classes])?;
        let grad_logits = &(probs - &onehot) * grad;
        Ok(vec![Some(grad_logits), None])
    }
}

/// 求均值，输出形状为[1]
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceMean;

impl Kernel for ReduceMean {
    fn name(&self) -> &'static str {
        "reduce_mean"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(Tensor::scalar(inputs[0].mean()))
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        let g = grad.number().unwrap_or(0.) / inputs[0].size().max(1) as f32;
        Ok(vec![Some(Tensor::full(inputs[0].shape(), g))])
    }
}

/// 求和，输出形状为[1]
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceSum;

impl Kernel for ReduceSum {
    fn name(&self) -> &'static str {
        "reduce_sum"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(Tensor::scalar(inputs[0].sum()))
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        let g = grad.number().unwrap_or(0.);
        Ok(vec![Some(Tensor::full(inputs[0].shape(), g))])
    }
}
