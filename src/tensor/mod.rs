use ndarray::{Array, ArrayD, ArrayViewD, Axis, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::TensorError;

mod arith;
mod blob;

pub use blob::DType;

#[cfg(test)]
mod tests;

/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：首个维度约定为批（batch）维度，批次截断、拼接、堆叠都沿该维度进行；
/// 损失等“标量”结果统一用形状`[1]`的张量表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// 创建一个张量，`data`的长度必须和`shape`中所有元素的乘积相等，否则panic。
    /// 需要可恢复错误时请用[`Tensor::try_new`]。
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        match Self::try_new(data.to_vec(), shape) {
            Ok(tensor) => tensor,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_new(data: Vec<f32>, shape: &[usize]) -> Result<Self, TensorError> {
        let data_len = data.len();
        Array::from_shape_vec(IxDyn(shape), data)
            .map(|data| Self { data })
            .map_err(|_| TensorError::DataShapeMismatch {
                data_len,
                shape: shape.to_vec(),
            })
    }

    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// 形状为`[1]`的“标量”张量
    pub fn scalar(value: f32) -> Self {
        Self::full(&[1], value)
    }

    /// 创建一个随机张量，其值在[min, max)区间内均匀分布
    pub fn new_uniform<R: Rng>(min: f32, max: f32, shape: &[usize], rng: &mut R) -> Self {
        let len = shape.iter().product::<usize>();
        let data = (0..len).map(|_| rng.gen_range(min..max)).collect::<Vec<_>>();
        Self::new(&data, shape)
    }

    /// 创建一个服从正态分布的随机张量（Box-Muller）
    pub fn new_normal<R: Rng>(mean: f32, std_dev: f32, shape: &[usize], rng: &mut R) -> Self {
        let len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
            let u2: f32 = rng.gen_range(0.0..1.0);
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            data.push(mean + std_dev * r * theta.cos());
            if data.len() < len {
                data.push(mean + std_dev * r * theta.sin());
            }
        }
        Self::new(&data, shape)
    }
}

// 属性
impl Tensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn dimension(&self) -> usize {
        self.data.ndim()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 批大小，即首个维度的长度；0 维张量视为 1
    pub fn batch_size(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    /// 若张量只含一个元素，返回该元素
    pub fn number(&self) -> Option<f32> {
        if self.size() == 1 {
            self.data.iter().next().copied()
        } else {
            None
        }
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    pub fn as_array(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// 按行优先（逻辑）顺序导出全部元素
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

// 计算
impl Tensor {
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Self {
        Self {
            data: self.data.mapv(f),
        }
    }

    pub fn sum(&self) -> f32 {
        self.data.sum()
    }

    pub fn mean(&self) -> f32 {
        if self.size() == 0 {
            0.
        } else {
            self.sum() / self.size() as f32
        }
    }

    pub fn sqrt(&self) -> Self {
        self.map(f32::sqrt)
    }

    /// 二维矩阵乘法
    pub fn mat_mul(&self, other: &Self) -> Result<Self, TensorError> {
        let lhs = self.as_matrix("矩阵乘")?;
        let rhs = other.as_matrix("矩阵乘")?;
        if lhs.ncols() != rhs.nrows() {
            return Err(TensorError::IncompatibleShapes {
                operator: "矩阵乘",
                lhs: self.shape().to_vec(),
                rhs: other.shape().to_vec(),
            });
        }
        Ok(Self {
            data: lhs.dot(&rhs).into_dyn(),
        })
    }

    /// 二维矩阵转置
    pub fn transpose(&self) -> Result<Self, TensorError> {
        let m = self.as_matrix("转置")?;
        Ok(Self {
            data: m.t().to_owned().into_dyn(),
        })
    }

    fn as_matrix(&self, operator: &'static str) -> Result<ndarray::ArrayView2<'_, f32>, TensorError> {
        self.data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|_| TensorError::RankMismatch {
                operator,
                expected: 2,
                got: self.shape().to_vec(),
            })
    }

    /// 将（可能经过广播的）张量按求和方式规约回`shape`，用于广播运算的反向传播
    pub fn sum_to_shape(&self, shape: &[usize]) -> Result<Self, TensorError> {
        let mut data = self.data.clone();
        while data.ndim() > shape.len() {
            data = data.sum_axis(Axis(0));
        }
        if data.ndim() != shape.len() {
            return Err(TensorError::IncompatibleShapes {
                operator: "规约",
                lhs: self.shape().to_vec(),
                rhs: shape.to_vec(),
            });
        }
        for (axis, &dim) in shape.iter().enumerate() {
            if dim == 1 && data.shape()[axis] != 1 {
                data = data.sum_axis(Axis(axis)).insert_axis(Axis(axis));
            } else if dim != data.shape()[axis] {
                return Err(TensorError::IncompatibleShapes {
                    operator: "规约",
                    lhs: self.shape().to_vec(),
                    rhs: shape.to_vec(),
                });
            }
        }
        Ok(Self { data })
    }

    /// 每一行（沿最后一个维度）最大值的下标
    pub fn argmax_rows(&self) -> Result<Vec<usize>, TensorError> {
        let m = self.as_matrix("argmax")?;
        Ok(m.rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                        if v > max { (i, v) } else { (best, max) }
                    })
                    .0
            })
            .collect())
    }
}

// 批维度上的操作
impl Tensor {
    /// 保留批维度上的前`keep`个样本
    pub fn slice_batch(&self, keep: usize) -> Result<Self, TensorError> {
        let batch = self.batch_size();
        if self.dimension() == 0 || keep > batch {
            return Err(TensorError::SliceOutOfRange { keep, batch });
        }
        Ok(Self {
            data: self
                .data
                .slice_axis(Axis(0), ndarray::Slice::from(0..keep))
                .to_owned(),
        })
    }

    /// 取出批维度上第`index`个样本（去掉首个维度）
    pub fn sample(&self, index: usize) -> Result<Self, TensorError> {
        let batch = self.batch_size();
        if self.dimension() == 0 || index >= batch {
            return Err(TensorError::SliceOutOfRange { keep: index + 1, batch });
        }
        Ok(Self {
            data: self.data.index_axis(Axis(0), index).to_owned(),
        })
    }

    /// 沿批维度拼接，除首个维度外其余维度须一致
    pub fn concat_batch(tensors: &[&Self]) -> Result<Self, TensorError> {
        let first = tensors.first().ok_or(TensorError::EmptyList)?;
        let views = tensors.iter().map(|t| t.data.view()).collect::<Vec<_>>();
        ndarray::concatenate(Axis(0), &views)
            .map(|data| Self { data })
            .map_err(|_| TensorError::IncompatibleShapes {
                operator: "拼接",
                lhs: first.shape().to_vec(),
                rhs: tensors
                    .iter()
                    .find(|t| t.shape().get(1..) != first.shape().get(1..))
                    .map(|t| t.shape().to_vec())
                    .unwrap_or_default(),
            })
    }

    /// 增加一个新的首维度并堆叠（如把单个样本组装成批次）
    pub fn stack(tensors: &[&Self]) -> Result<Self, TensorError> {
        let first = tensors.first().ok_or(TensorError::EmptyList)?;
        let views = tensors.iter().map(|t| t.data.view()).collect::<Vec<_>>();
        ndarray::stack(Axis(0), &views)
            .map(|data| Self { data })
            .map_err(|_| TensorError::IncompatibleShapes {
                operator: "堆叠",
                lhs: first.shape().to_vec(),
                rhs: tensors
                    .iter()
                    .find(|t| t.shape() != first.shape())
                    .map(|t| t.shape().to_vec())
                    .unwrap_or_default(),
            })
    }
}

impl approx::AbsDiffEq for Tensor {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        f32::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}
