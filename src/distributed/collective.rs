use crate::errors::Result;
use crate::tensor::Tensor;

/// 集合通信原语。调用是同步阻塞的；通信挂起或失败不在本层处理
pub trait Collective: Send + Sync {
    fn nranks(&self) -> usize;

    fn rank(&self) -> usize;

    /// 沿批维度拼接所有进程的张量（按进程编号排列）
    fn all_gather(&self, tensor: &Tensor) -> Result<Tensor>;

    /// 所有进程的张量逐元素求和
    fn all_reduce_sum(&self, tensor: &Tensor) -> Result<Tensor>;
}

/// 单进程：所有集合操作都是恒等
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn nranks(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_gather(&self, tensor: &Tensor) -> Result<Tensor> {
        Ok(tensor.clone())
    }

    fn all_reduce_sum(&self, tensor: &Tensor) -> Result<Tensor> {
        Ok(tensor.clone())
    }
}

/// 在单个进程内模拟`nranks`个完全相同的副本：
/// all-gather 得到`nranks`份拷贝的拼接，all-reduce 得到`nranks`倍
#[derive(Debug, Clone, Copy)]
pub struct LoopbackCollective {
    nranks: usize,
}

impl LoopbackCollective {
    pub fn new(nranks: usize) -> Self {
        Self {
            nranks: nranks.max(1),
        }
    }
}

impl Collective for LoopbackCollective {
    fn nranks(&self) -> usize {
        self.nranks
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_gather(&self, tensor: &Tensor) -> Result<Tensor> {
        let copies = vec![tensor; self.nranks];
        Ok(Tensor::concat_batch(&copies)?)
    }

    fn all_reduce_sum(&self, tensor: &Tensor) -> Result<Tensor> {
        Ok(tensor * self.nranks as f32)
    }
}
