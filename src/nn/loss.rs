/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 损失函数。`forward`给出逐样本的损失项，`compute`再按均值或求和规约成标量
 */

use crate::engine::{Emitter, VarId};
use crate::errors::{HapiError, Result};

pub trait Loss {
    /// 规约方式：true 取均值，false 求和
    fn average(&self) -> bool {
        true
    }

    /// 每个输出/标签对产生一个逐样本损失项
    fn forward(
        &self,
        emitter: &mut dyn Emitter,
        outputs: &[VarId],
        labels: &[VarId],
    ) -> Result<Vec<VarId>>;

    /// 规约后的损失项，每项形状为[1]
    fn compute(
        &self,
        emitter: &mut dyn Emitter,
        outputs: &[VarId],
        labels: &[VarId],
    ) -> Result<Vec<VarId>> {
        self.forward(emitter, outputs, labels)?
            .into_iter()
            .map(|term| {
                if self.average() {
                    emitter.reduce_mean(term)
                } else {
                    emitter.reduce_sum(term)
                }
            })
            .collect()
    }
}

fn pair_up<'a>(
    loss: &str,
    outputs: &'a [VarId],
    labels: &'a [VarId],
) -> Result<impl Iterator<Item = (&'a VarId, &'a VarId)>> {
    if outputs.len() != labels.len() || labels.is_empty() {
        return Err(HapiError::InvalidArgument(format!(
            "{loss}需要一一对应的输出与标签，但得到{}个输出、{}个标签",
            outputs.len(),
            labels.len()
        )));
    }
    Ok(outputs.iter().zip(labels))
}

/// softmax 交叉熵，输出为未归一化的 logits，标签为类别下标
#[derive(Debug, Clone)]
pub struct CrossEntropy {
    average: bool,
}

impl CrossEntropy {
    pub fn new(average: bool) -> Self {
        Self { average }
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Loss for CrossEntropy {
    fn average(&self) -> bool {
        self.average
    }

    fn forward(
        &self,
        emitter: &mut dyn Emitter,
        outputs: &[VarId],
        labels: &[VarId],
    ) -> Result<Vec<VarId>> {
        pair_up("CrossEntropy", outputs, labels)?
            .map(|(&o, &l)| emitter.softmax_cross_entropy(o, l))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MeanSquaredError {
    average: bool,
}

impl MeanSquaredError {
    pub fn new(average: bool) -> Self {
        Self { average }
    }
}

impl Default for MeanSquaredError {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Loss for MeanSquaredError {
    fn average(&self) -> bool {
        self.average
    }

    fn forward(
        &self,
        emitter: &mut dyn Emitter,
        outputs: &[VarId],
        labels: &[VarId],
    ) -> Result<Vec<VarId>> {
        pair_up("MeanSquaredError", outputs, labels)?
            .map(|(&o, &l)| emitter.square_error(o, l))
            .collect()
    }
}
