use crate::adapter::Mode;

/// 分布式评估/推理时的样本计数，用来剔除为对齐各进程分片而补齐的样本。
///
/// 每个批次调用一次`advance`：已消费样本数加上本批样本数达到数据集大小时，
/// 本批为最后一批，只保留前`total_size - 已消费`个样本并把计数清零；
/// 否则累加计数。训练模式不做任何修正。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCount {
    pub eval_total: usize,
    pub eval_batch: usize,
    pub test_total: usize,
    pub test_batch: usize,
}

impl MergeCount {
    fn slots(&mut self, mode: Mode) -> Option<(&mut usize, &mut usize)> {
        match mode {
            Mode::Train => None,
            Mode::Eval => Some((&mut self.eval_total, &mut self.eval_batch)),
            Mode::Test => Some((&mut self.test_total, &mut self.test_batch)),
        }
    }

    /// 记录一个批次，返回该批次中应保留（非补齐）的样本数
    pub fn advance(&mut self, mode: Mode, samples: usize, total_size: usize) -> usize {
        let Some((total, batch)) = self.slots(mode) else {
            return samples;
        };
        if *total + samples >= total_size {
            let keep = total_size.saturating_sub(*total);
            *total = 0;
            *batch = keep;
            keep
        } else {
            *total += samples;
            *batch = samples;
            samples
        }
    }

    /// 最近一个批次的有效样本数（用于日志），训练模式或尚无记录时为0
    pub fn effective_batch(&self, mode: Mode) -> usize {
        match mode {
            Mode::Train => 0,
            Mode::Eval => self.eval_batch,
            Mode::Test => self.test_batch,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
