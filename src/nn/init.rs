use rand::rngs::StdRng;

use crate::tensor::Tensor;

/// 参数初始化方式
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// 常数初始化
    Constant(f32),
    /// 全零
    Zeros,
    /// 全一
    Ones,
    /// [low, high)区间内均匀分布
    Uniform { low: f32, high: f32 },
    /// 正态分布
    Normal { mean: f32, std: f32 },
    /// Kaiming/He 初始化（适用于 `ReLU`）
    Kaiming,
    /// Xavier/Glorot 均匀初始化（适用于 Sigmoid/Tanh）
    Xavier,
}

impl Init {
    /// 生成初始化后的 Tensor（使用指定的 RNG）
    pub fn generate_with_rng(&self, shape: &[usize], rng: &mut StdRng) -> Tensor {
        match self {
            Self::Constant(v) => Tensor::full(shape, *v),
            Self::Zeros => Tensor::zeros(shape),
            Self::Ones => Tensor::full(shape, 1.),
            Self::Uniform { low, high } => Tensor::new_uniform(*low, *high, shape, rng),
            Self::Normal { mean, std } => Tensor::new_normal(*mean, *std, shape, rng),
            Self::Kaiming => {
                let fan_in = shape.first().copied().unwrap_or(1).max(1);
                let std = (2.0 / fan_in as f32).sqrt();
                Tensor::new_normal(0.0, std, shape, rng)
            }
            Self::Xavier => {
                let fan_in = shape.first().copied().unwrap_or(1);
                let fan_out = shape.get(1).copied().unwrap_or(1);
                let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                Tensor::new_uniform(-limit, limit, shape, rng)
            }
        }
    }
}
