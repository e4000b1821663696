//! 张量与“原始字节块”之间的转换，供检查点文件使用

use serde::{Deserialize, Serialize};

use super::Tensor;
use crate::errors::TensorError;

/// 检查点中数组的元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
}

impl DType {
    pub const fn size_in_bytes(&self) -> usize {
        match self {
            Self::F32 => 4,
        }
    }
}

impl Tensor {
    pub const fn dtype(&self) -> DType {
        DType::F32
    }

    /// 按逻辑顺序导出小端字节
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// 由小端字节与形状还原张量
    pub fn from_le_bytes(dtype: DType, shape: &[usize], bytes: &[u8]) -> Result<Self, TensorError> {
        let width = dtype.size_in_bytes();
        if bytes.len() % width != 0 {
            return Err(TensorError::DataShapeMismatch {
                data_len: bytes.len(),
                shape: shape.to_vec(),
            });
        }
        let data = bytes
            .chunks_exact(width)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect::<Vec<_>>();
        Self::try_new(data, shape)
    }
}
