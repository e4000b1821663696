/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 多进程数据并行：环境配置、集合通信、进程级分布式上下文、
 *                 分布式评估时的补齐样本修正，以及按进程切分批次的采样器
 */

mod collective;
mod context;
mod env;
mod merge;
mod sampler;

pub use collective::{Collective, LocalCollective, LoopbackCollective};
pub use context::{CollectiveFactory, LocalFactory, LoopbackFactory, ParallelContext};
pub use env::ParallelEnv;
pub use merge::MergeCount;
pub use sampler::DistributedBatchSampler;
