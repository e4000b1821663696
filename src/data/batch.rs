/*
 * @Author       : 老董
 * @Date         : 2026-02-09
 * @Description  : 训练循环消费的批次，以及 fit/evaluate/predict 接受的数据来源
 */

use std::sync::Arc;

use super::{DataError, DataLoader, Dataset};
use crate::errors::Result;
use crate::tensor::Tensor;

/// 一个批次的两种形态
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// `[输入..., 标签...]`
    Flat(Vec<Tensor>),
    /// `(输入, 标签)`
    Paired(Vec<Tensor>, Vec<Tensor>),
}

impl Batch {
    /// 拆成（输入，标签）；扁平批次按声明的输入个数切分，
    /// 多出的字段视为标签
    pub fn split(self, inputs: usize) -> Result<(Vec<Tensor>, Vec<Tensor>)> {
        match self {
            Self::Paired(x, y) => Ok((x, y)),
            Self::Flat(mut fields) => {
                if fields.len() < inputs {
                    return Err(DataError::NotEnoughFields {
                        inputs,
                        got: fields.len(),
                    }
                    .into());
                }
                let labels = fields.split_off(inputs);
                Ok((fields, labels))
            }
        }
    }

    /// 首个字段的批大小
    pub fn batch_size(&self) -> usize {
        let first = match self {
            Self::Flat(fields) => fields.first(),
            Self::Paired(x, _) => x.first(),
        };
        first.map_or(0, Tensor::batch_size)
    }
}

impl From<(Tensor, Tensor)> for Batch {
    fn from((x, y): (Tensor, Tensor)) -> Self {
        Self::Paired(vec![x], vec![y])
    }
}

/// fit/evaluate/predict 的数据来源
pub enum DataSource {
    /// 数据集；由训练循环按 FitOptions 构造分布式加载器
    Dataset(Arc<dyn Dataset>),
    /// 已配置好的加载器，确切的数据集大小已知
    Loader(DataLoader),
    /// 任意批次序列，数据集大小未知（不做补齐修正）
    Batches(Vec<Batch>),
}

impl DataSource {
    pub fn dataset(dataset: impl Dataset + 'static) -> Self {
        Self::Dataset(Arc::new(dataset))
    }

    /// 确切的数据集大小（仅数据集/加载器来源可知）
    pub fn dataset_len(&self) -> Option<usize> {
        match self {
            Self::Dataset(d) => Some(d.len()),
            Self::Loader(l) => Some(l.dataset_len()),
            Self::Batches(_) => None,
        }
    }
}

impl From<DataLoader> for DataSource {
    fn from(loader: DataLoader) -> Self {
        Self::Loader(loader)
    }
}

impl From<Vec<Batch>> for DataSource {
    fn from(batches: Vec<Batch>) -> Self {
        Self::Batches(batches)
    }
}
