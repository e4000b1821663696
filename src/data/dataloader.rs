/*
 * @Author       : 老董
 * @Date         : 2026-02-09
 * @Description  : DataLoader - 基于分布式批采样器的数据批量加载器
 *
 * 提供统一的数据迭代 API，支持：
 * - 自动分批 (batch_size)
 * - 随机打乱 (shuffle)，打乱顺序随轮次 (epoch) 变化
 * - 丢弃不完整批次 (drop_last)
 * - 多进程分片：样本补齐到进程数的整数倍后按批交错分配
 */

use std::sync::Arc;
use std::vec::IntoIter;

use super::{Batch, Dataset};
use crate::distributed::DistributedBatchSampler;
use crate::errors::Result;

/// DataLoader - 数据批量加载器
///
/// # 示例
/// ```ignore
/// let dataset = TensorDataset::pair(train_x, train_y)?;
/// let loader = DataLoader::new(dataset, 32)?
///     .shuffle(true)
///     .seed(42);
///
/// for batch in loader.iter() {
///     let (inputs, labels) = batch?.split(1)?;
///     model.train_batch(&inputs, &labels)?;
/// }
/// ```
#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    sampler: DistributedBatchSampler,
    shuffle: bool,
    seed: u64,
}

impl DataLoader {
    /// 创建单进程加载器
    ///
    /// # 参数
    /// - `dataset`: 数据集
    /// - `batch_size`: 批大小，须大于0
    pub fn new(dataset: impl Dataset + 'static, batch_size: usize) -> Result<Self> {
        Self::from_shared(Arc::new(dataset), batch_size, 1, 0)
    }

    /// 由共享的数据集创建，并指定进程数与本进程编号
    pub fn from_shared(
        dataset: Arc<dyn Dataset>,
        batch_size: usize,
        nranks: usize,
        local_rank: usize,
    ) -> Result<Self> {
        let sampler = DistributedBatchSampler::new(dataset.len(), batch_size, nranks, local_rank)?;
        Ok(Self {
            dataset,
            sampler,
            shuffle: false,
            seed: 0,
        })
    }

    /// 设置是否打乱
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self.sampler = self.sampler.with_shuffle(shuffle, self.seed);
        self
    }

    /// 设置随机种子（用于可重复的打乱）
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.sampler = self.sampler.with_shuffle(self.shuffle, seed);
        self
    }

    /// 设置是否丢弃不完整的最后一个批次
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.sampler = self.sampler.with_drop_last(drop_last);
        self
    }

    pub fn set_epoch(&mut self, epoch: u64) {
        self.sampler.set_epoch(epoch);
    }

    /// 数据集的确切大小（不含补齐）
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// 本进程每轮的批次数
    pub fn num_batches(&self) -> usize {
        self.sampler.len()
    }

    pub fn len(&self) -> usize {
        self.num_batches()
    }

    pub fn is_empty(&self) -> bool {
        self.sampler.is_empty()
    }

    /// 返回本轮的批次迭代器，每个批次为扁平的`[输入..., 标签...]`
    pub fn iter(&self) -> DataLoaderIter<'_> {
        DataLoaderIter {
            dataset: self.dataset.as_ref(),
            batches: self.sampler.batches().into_iter(),
        }
    }
}

/// DataLoader 迭代器
pub struct DataLoaderIter<'a> {
    dataset: &'a dyn Dataset,
    batches: IntoIter<Vec<usize>>,
}

impl Iterator for DataLoaderIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.batches.next()?;
        Some(self.dataset.collate(&indices).map(Batch::Flat))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batches.size_hint()
    }
}

impl ExactSizeIterator for DataLoaderIter<'_> {}
