/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 评估指标。`add_metric_op`在图中（或即时）算出逐样本的中间状态，
 *                 `update`在主机侧用这些状态更新累计值
 */

use crate::engine::{Emitter, VarId};
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

pub trait Metric {
    fn add_metric_op(
        &self,
        emitter: &mut dyn Emitter,
        outputs: &[VarId],
        labels: &[VarId],
    ) -> Result<Vec<VarId>>;

    /// 用一个批次的状态更新累计值，返回该批次上的指标
    fn update(&mut self, states: &[Tensor]) -> Result<Vec<f32>>;

    /// 自上次`reset`以来的累计指标
    fn accumulate(&self) -> Vec<f32>;

    fn reset(&mut self);

    fn name(&self) -> Vec<String>;
}

/// top-k 准确率
#[derive(Debug, Clone)]
pub struct Accuracy {
    topk: Vec<usize>,
    name: String,
    correct: Vec<f64>,
    count: Vec<usize>,
}

impl Accuracy {
    pub fn new(topk: &[usize]) -> Result<Self> {
        Self::with_name(topk, "acc")
    }

    pub fn with_name(topk: &[usize], name: &str) -> Result<Self> {
        if topk.is_empty() || topk.contains(&0) {
            return Err(HapiError::InvalidArgument(format!(
                "topk 须为非空且每项大于0，但得到{topk:?}"
            )));
        }
        Ok(Self {
            topk: topk.to_vec(),
            name: name.to_string(),
            correct: vec![0.; topk.len()],
            count: vec![0; topk.len()],
        })
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self {
            topk: vec![1],
            name: "acc".to_string(),
            correct: vec![0.],
            count: vec![0],
        }
    }
}

impl Metric for Accuracy {
    fn add_metric_op(
        &self,
        emitter: &mut dyn Emitter,
        outputs: &[VarId],
        labels: &[VarId],
    ) -> Result<Vec<VarId>> {
        let (Some(&pred), Some(&label)) = (outputs.first(), labels.first()) else {
            return Err(HapiError::InvalidArgument(
                "Accuracy 需要至少一个输出与一个标签".to_string(),
            ));
        };
        self.topk
            .iter()
            .map(|&k| emitter.topk_correct(pred, label, k))
            .collect()
    }

    fn update(&mut self, states: &[Tensor]) -> Result<Vec<f32>> {
        if states.len() != self.topk.len() {
            return Err(HapiError::InvalidArgument(format!(
                "Accuracy 期望{}个状态，但得到{}个",
                self.topk.len(),
                states.len()
            )));
        }
        let mut batch_acc = Vec::with_capacity(states.len());
        for (i, state) in states.iter().enumerate() {
            let num = state.batch_size();
            let correct = state.sum() as f64;
            self.correct[i] += correct;
            self.count[i] += num;
            batch_acc.push(if num == 0 { 0. } else { (correct / num as f64) as f32 });
        }
        Ok(batch_acc)
    }

    fn accumulate(&self) -> Vec<f32> {
        self.correct
            .iter()
            .zip(&self.count)
            .map(|(&c, &n)| if n == 0 { 0. } else { (c / n as f64) as f32 })
            .collect()
    }

    fn reset(&mut self) {
        self.correct.iter_mut().for_each(|c| *c = 0.);
        self.count.iter_mut().for_each(|n| *n = 0);
    }

    fn name(&self) -> Vec<String> {
        if self.topk.len() == 1 {
            vec![self.name.clone()]
        } else {
            self.topk
                .iter()
                .map(|k| format!("{}_top{k}", self.name))
                .collect()
        }
    }
}
