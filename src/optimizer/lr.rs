use crate::errors::{HapiError, Result};

/// 学习率：固定值，或按步数分段
#[derive(Debug, Clone, PartialEq)]
pub enum LearningRate {
    Fixed(f32),
    /// 第`step`步的学习率：第一个满足`step < boundaries[i]`的`values[i]`，否则取最后一个值
    Piecewise { boundaries: Vec<i64>, values: Vec<f32> },
}

impl LearningRate {
    pub fn piecewise(boundaries: &[i64], values: &[f32]) -> Result<Self> {
        if values.len() != boundaries.len() + 1 {
            return Err(HapiError::InvalidArgument(format!(
                "分段学习率需要{}个取值，但得到{}个",
                boundaries.len() + 1,
                values.len()
            )));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(HapiError::InvalidArgument(format!(
                "分段学习率的边界须严格递增：{boundaries:?}"
            )));
        }
        Ok(Self::Piecewise {
            boundaries: boundaries.to_vec(),
            values: values.to_vec(),
        })
    }

    /// 是否带衰减计数器
    pub const fn is_scheduled(&self) -> bool {
        matches!(self, Self::Piecewise { .. })
    }

    pub fn value_at(&self, step: i64) -> f32 {
        match self {
            Self::Fixed(lr) => *lr,
            Self::Piecewise { boundaries, values } => boundaries
                .iter()
                .position(|&b| step < b)
                .and_then(|i| values.get(i))
                .or_else(|| values.last())
                .copied()
                .unwrap_or(0.),
        }
    }
}

impl From<f32> for LearningRate {
    fn from(lr: f32) -> Self {
        Self::Fixed(lr)
    }
}
