use super::{Kernel, KernelContext, no_grad};
use crate::errors::{Result, TensorError};
use crate::tensor::Tensor;

/// 每个样本的标签是否落在预测得分的前`k`名内：[pred(N, C), label(N, 1)] -> (N, 1)，取值0或1
#[derive(Debug, Clone, PartialEq)]
pub struct TopkCorrect {
    pub k: usize,
}

impl Kernel for TopkCorrect {
    fn name(&self) -> &'static str {
        "topk_correct"
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        let pred = inputs[0];
        if pred.dimension() != 2 {
            return Err(TensorError::RankMismatch {
                operator: "topk",
                expected: 2,
                got: pred.shape().to_vec(),
            }
            .into());
        }
        let (rows, classes) = (pred.shape()[0], pred.shape()[1]);
        let labels = inputs[1].to_vec();
        if labels.len() != rows {
            return Err(TensorError::IncompatibleShapes {
                operator: "计算topk",
                lhs: pred.shape().to_vec(),
                rhs: inputs[1].shape().to_vec(),
            }
            .into());
        }
        let scores = pred.to_vec();
        let correct = scores
            .chunks(classes)
            .zip(labels)
            .map(|(row, label)| {
                // 负标签不对应任何类别，记为未命中
                let label = label.round();
                if label < 0. {
                    return 0.;
                }
                match row.get(label as usize) {
                    Some(&target) => {
                        // 严格大于目标得分的类别数小于k，即认为命中
                        let better = row.iter().filter(|&&s| s > target).count();
                        if better < self.k { 1. } else { 0. }
                    }
                    None => 0.,
                }
            })
            .collect::<Vec<f32>>();
        Ok(Tensor::try_new(correct, &[rows, 1])?)
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
