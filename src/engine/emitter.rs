use super::ops::{
    Add, AllGather, Dropout, MatMul, Op, ReduceMean, ReduceSum, Relu, Scale, Sigmoid,
    SoftmaxCrossEntropy, SquaredError, SumN, Tanh, TopkCorrect,
};
use super::VarId;
use crate::errors::Result;

/// 网络、损失函数与评估指标“发出”算子的统一入口。
///
/// 静态图下，实现者把算子追加到程序里，返回的`VarId`只是符号；
/// 动态图下，实现者立即执行算子并把结果记录到记录带上。
/// 同一份`Network::forward`因此可以不加修改地跑在两种模式下。
pub trait Emitter {
    /// 取得（按结构化名字登记的）参数变量
    fn parameter(&mut self, name: &str) -> Result<VarId>;

    fn apply(&mut self, op: Op, inputs: &[VarId]) -> Result<VarId>;

    /// 是否处于推理模式（eval/test）
    fn is_test(&self) -> bool;

    fn mat_mul(&mut self, x: VarId, w: VarId) -> Result<VarId> {
        self.apply(MatMul.into(), &[x, w])
    }

    fn add(&mut self, a: VarId, b: VarId) -> Result<VarId> {
        self.apply(Add.into(), &[a, b])
    }

    fn scale(&mut self, x: VarId, factor: f32) -> Result<VarId> {
        self.apply(Scale { factor }.into(), &[x])
    }

    fn sum(&mut self, xs: &[VarId]) -> Result<VarId> {
        self.apply(SumN.into(), xs)
    }

    fn relu(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Relu.into(), &[x])
    }

    fn tanh(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Tanh.into(), &[x])
    }

    fn sigmoid(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Sigmoid.into(), &[x])
    }

    fn dropout(&mut self, x: VarId, prob: f32) -> Result<VarId> {
        self.apply(Dropout::new(prob)?.into(), &[x])
    }

    fn square_error(&mut self, pred: VarId, label: VarId) -> Result<VarId> {
        self.apply(SquaredError.into(), &[pred, label])
    }

    fn softmax_cross_entropy(&mut self, logits: VarId, label: VarId) -> Result<VarId> {
        self.apply(SoftmaxCrossEntropy.into(), &[logits, label])
    }

    fn reduce_mean(&mut self, x: VarId) -> Result<VarId> {
        self.apply(ReduceMean.into(), &[x])
    }

    fn reduce_sum(&mut self, x: VarId) -> Result<VarId> {
        self.apply(ReduceSum.into(), &[x])
    }

    fn topk_correct(&mut self, pred: VarId, label: VarId, k: usize) -> Result<VarId> {
        self.apply(TopkCorrect { k }.into(), &[pred, label])
    }

    fn all_gather(&mut self, x: VarId, nranks: usize) -> Result<VarId> {
        self.apply(AllGather { nranks }.into(), &[x])
    }
}
