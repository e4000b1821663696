/*
 * @Author       : 老董
 * @Date         : 2026-02-09
 * @Description  : 数据集：按下标取出单个样本（各字段均不含批维度），
 *                 再由默认的 collate 堆叠成批次
 */

use super::DataError;
use crate::errors::Result;
use crate::tensor::Tensor;

/// 数据集
///
/// 一个样本由若干字段组成，顺序为`[输入..., 标签...]`
pub trait Dataset: Send + Sync {
    /// 样本总数（不含任何补齐）
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 第`index`个样本的各字段
    fn get(&self, index: usize) -> Result<Vec<Tensor>>;

    /// 按下标组装一个批次：逐个取样本，再把同一字段堆叠到新的批维度上
    fn collate(&self, indices: &[usize]) -> Result<Vec<Tensor>> {
        let samples = indices
            .iter()
            .map(|&i| self.get(i))
            .collect::<Result<Vec<_>>>()?;
        let Some(first) = samples.first() else {
            return Ok(Vec::new());
        };
        (0..first.len())
            .map(|field| {
                let column = samples.iter().map(|s| &s[field]).collect::<Vec<_>>();
                Ok(Tensor::stack(&column)?)
            })
            .collect()
    }
}

/// TensorDataset - 由若干个首维度（样本数）一致的张量组成的数据集
///
/// # 示例
/// ```ignore
/// let dataset = TensorDataset::pair(features, labels)?;
/// println!("样本数: {}", dataset.len());
/// ```
#[derive(Clone)]
pub struct TensorDataset {
    fields: Vec<Tensor>,
    len: usize,
}

impl TensorDataset {
    /// 创建新的 TensorDataset
    ///
    /// # 参数
    /// - `fields`: 各字段张量，第一维为样本数，且必须彼此一致
    pub fn new(fields: Vec<Tensor>) -> Result<Self> {
        let first = fields.first().ok_or(DataError::NoField)?;
        let len = first.shape().first().copied().unwrap_or(0);
        if let Some((field, t)) = fields
            .iter()
            .enumerate()
            .find(|(_, t)| t.shape().first().copied().unwrap_or(0) != len)
        {
            return Err(DataError::LengthMismatch {
                field,
                expected: len,
                got: t.shape().first().copied().unwrap_or(0),
            }
            .into());
        }
        Ok(Self { fields, len })
    }

    /// 最常见的“一个特征 + 一个标签”
    pub fn pair(features: Tensor, labels: Tensor) -> Result<Self> {
        Self::new(vec![features, labels])
    }

    /// 获取各字段张量引用
    pub fn fields(&self) -> &[Tensor] {
        &self.fields
    }
}

impl Dataset for TensorDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Vec<Tensor>> {
        if index >= self.len {
            return Err(DataError::IndexOutOfBounds {
                index,
                len: self.len,
            }
            .into());
        }
        self.fields
            .iter()
            .map(|t| Ok(t.sample(index)?))
            .collect()
    }
}
