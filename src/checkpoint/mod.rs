/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 检查点：状态字典、`.pdparams`/`.pdopt`两种产物的读写，
 *                 以及优化器累积量在静态图/动态图两种命名之间的转换
 */

mod codec;
mod translate;

pub use codec::{load_state, optimizer_path, params_path, save_state};
pub use translate::{CheckpointTranslator, RequiredVar, VarRole};

use std::collections::BTreeMap;

use crate::tensor::Tensor;

#[cfg(test)]
mod tests;

/// 学习率衰减计数器在静态图中的名字
pub const STATIC_COUNTER: &str = "@LR_DECAY_COUNTER@";
/// 学习率衰减计数器在动态图中的名字
pub const DYNAMIC_COUNTER: &str = "global_step";
/// 静态图下固定学习率变量名的前缀
pub const LEARNING_RATE_PREFIX: &str = "learning_rate_";

/// 状态字典中的一项：张量，或（计数器等）纯数
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Tensor(Tensor),
    Int(i64),
    Float(f64),
}

impl StateValue {
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0. => Some(*v as i64),
            Self::Tensor(t) => t.number().map(|v| v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Tensor(t) => t.number().map(f64::from),
        }
    }

    /// 用于错误信息的形状描述，纯数视为形状`[]`
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Tensor(t) => t.shape().to_vec(),
            _ => Vec::new(),
        }
    }
}

impl From<Tensor> for StateValue {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

/// 变量名 -> 值，按名字有序
pub type StateDict = BTreeMap<String, StateValue>;
