//! 数据加载模块
//!
//! 提供数据集抽象与批处理功能，供`Model::fit`/`evaluate`/`predict`消费。
//!
//! # 主要组件
//!
//! - [`Dataset`]: 按下标取样本的数据集抽象
//! - [`TensorDataset`]: 由若干张量字段组成的数据集
//! - [`DataLoader`]: 基于分布式批采样器的批量加载器，已知确切的数据集大小
//! - [`Batch`]: 扁平 (`[输入..., 标签...]`) 或成对 (`(输入, 标签)`) 的批次
//! - [`DataSource`]: 训练循环接受的数据来源
//! - [`DataError`]: 数据加载错误类型
//!
//! # 使用示例
//!
//! ```ignore
//! use hapi_core::data::{DataLoader, TensorDataset};
//!
//! let dataset = TensorDataset::pair(train_x, train_y)?;
//! let loader = DataLoader::new(dataset, 32)?.shuffle(true).seed(42);
//!
//! for batch in loader.iter() {
//!     let (inputs, labels) = batch?.split(1)?;
//!     model.train_batch(&inputs, &labels)?;
//! }
//! ```

mod batch;
mod dataloader;
mod dataset;
pub mod error;

#[cfg(test)]
mod tests;

// Re-exports
pub use batch::{Batch, DataSource};
pub use dataloader::{DataLoader, DataLoaderIter};
pub use dataset::{Dataset, TensorDataset};
pub use error::DataError;
