/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 分布式批采样器：把样本下标补齐到进程数的整数倍（重复开头的下标），
 *                 再按批交错分给各进程；不足一个全局批的尾部在各进程间平分
 */

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::errors::{HapiError, Result};

#[derive(Debug, Clone)]
pub struct DistributedBatchSampler {
    dataset_len: usize,
    batch_size: usize,
    nranks: usize,
    local_rank: usize,
    shuffle: bool,
    drop_last: bool,
    seed: u64,
    epoch: u64,
}

impl DistributedBatchSampler {
    pub fn new(dataset_len: usize, batch_size: usize, nranks: usize, local_rank: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(HapiError::InvalidArgument("batch_size 须大于0".to_string()));
        }
        if nranks == 0 || local_rank >= nranks {
            return Err(HapiError::InvalidArgument(format!(
                "进程编号{local_rank}不在[0, {nranks})内"
            )));
        }
        Ok(Self {
            dataset_len,
            batch_size,
            nranks,
            local_rank,
            shuffle: false,
            drop_last: false,
            seed: 0,
            epoch: 0,
        })
    }

    pub fn with_shuffle(mut self, shuffle: bool, seed: u64) -> Self {
        self.shuffle = shuffle;
        self.seed = seed;
        self
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// 设置轮次，打乱顺序随轮次变化
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    pub fn dataset_len(&self) -> usize {
        self.dataset_len
    }

    /// 每个进程分到的样本数（含补齐）
    pub fn num_samples(&self) -> usize {
        self.dataset_len.div_ceil(self.nranks)
    }

    fn total_size(&self) -> usize {
        self.num_samples() * self.nranks
    }

    fn local_indices(&self) -> Vec<usize> {
        let mut indices = (0..self.dataset_len).collect::<Vec<_>>();
        let padding = self.total_size() - self.dataset_len;
        indices.extend((0..padding).map(|i| i % self.dataset_len.max(1)));
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
            indices.shuffle(&mut rng);
        }
        if self.nranks == 1 {
            return indices;
        }

        let global_batch = self.batch_size * self.nranks;
        let last_batch = self.total_size() % global_batch;
        let last_local = last_batch / self.nranks;
        let body_end = indices.len() - last_batch;

        let mut local = Vec::with_capacity(self.num_samples());
        let mut start = self.local_rank * self.batch_size;
        while start < body_end {
            local.extend_from_slice(&indices[start..start + self.batch_size]);
            start += global_batch;
        }
        let tail = &indices[body_end..];
        local.extend_from_slice(&tail[self.local_rank * last_local..(self.local_rank + 1) * last_local]);
        local
    }

    /// 本进程本轮的批次（样本下标）
    pub fn batches(&self) -> Vec<Vec<usize>> {
        self.local_indices()
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    pub fn len(&self) -> usize {
        let n = self.num_samples();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
