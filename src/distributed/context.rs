/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 进程级分布式上下文：集合通信只在第一次需要时构造一次，
 *                 之后的`ensure_initialized`调用都是空操作
 */

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Collective, LocalCollective, LoopbackCollective, ParallelEnv};
use crate::engine::Device;
use crate::errors::{HapiError, Result};

/// 构造集合通信后端
pub trait CollectiveFactory: Send + Sync {
    fn create(&self, env: &ParallelEnv, device: Device) -> Result<Arc<dyn Collective>>;
}

/// 仅支持单进程的后端
#[derive(Debug, Default)]
pub struct LocalFactory;

impl CollectiveFactory for LocalFactory {
    fn create(&self, env: &ParallelEnv, _device: Device) -> Result<Arc<dyn Collective>> {
        if env.is_distributed() {
            return Err(HapiError::InvalidArgument(format!(
                "当前构建没有跨进程通信后端，无法以{}个进程运行",
                env.nranks
            )));
        }
        Ok(Arc::new(LocalCollective))
    }
}

/// 进程内模拟多副本的后端
#[derive(Debug, Default)]
pub struct LoopbackFactory;

impl CollectiveFactory for LoopbackFactory {
    fn create(&self, env: &ParallelEnv, _device: Device) -> Result<Arc<dyn Collective>> {
        Ok(Arc::new(LoopbackCollective::new(env.nranks)))
    }
}

pub struct ParallelContext {
    env: ParallelEnv,
    factory: Box<dyn CollectiveFactory>,
    collective: OnceCell<Arc<dyn Collective>>,
}

static GLOBAL_CONTEXT: OnceCell<Arc<ParallelContext>> = OnceCell::new();

impl ParallelContext {
    pub fn new(env: ParallelEnv, factory: Box<dyn CollectiveFactory>) -> Self {
        Self {
            env,
            factory,
            collective: OnceCell::new(),
        }
    }

    /// 单进程上下文
    pub fn local() -> Self {
        Self::new(ParallelEnv::default(), Box::new(LocalFactory))
    }

    /// 进程级共享的上下文；未安装时按环境变量创建
    pub fn global() -> Arc<Self> {
        GLOBAL_CONTEXT
            .get_or_init(|| {
                let env = ParallelEnv::from_env().unwrap_or_else(|e| {
                    warn!("读取并行环境变量失败，按单进程运行：{e}");
                    ParallelEnv::default()
                });
                Arc::new(Self::new(env, Box::new(LocalFactory)))
            })
            .clone()
    }

    /// 在第一次使用`global()`之前安装自定义的进程级上下文
    pub fn install_global(context: Arc<Self>) -> Result<()> {
        GLOBAL_CONTEXT.set(context).map_err(|_| {
            HapiError::InvalidArgument("进程级分布式上下文已经存在，不能重复安装".to_string())
        })
    }

    pub fn env(&self) -> &ParallelEnv {
        &self.env
    }

    pub fn nranks(&self) -> usize {
        self.env.nranks
    }

    pub fn local_rank(&self) -> usize {
        self.env.local_rank
    }

    /// 构造集合通信（至多一次，线程安全）
    pub fn ensure_initialized(&self, device: Device) -> Result<Arc<dyn Collective>> {
        self.collective
            .get_or_try_init(|| {
                debug!(
                    "初始化分布式上下文：nranks={}, rank={}, device={device}",
                    self.env.nranks, self.env.local_rank
                );
                self.factory.create(&self.env, device)
            })
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.collective.get().is_some()
    }

    /// 可用的集合通信：单进程时总是可用；多进程时须先`ensure_initialized`
    pub fn collective(&self) -> Option<Arc<dyn Collective>> {
        match self.collective.get() {
            Some(c) => Some(c.clone()),
            None if !self.env.is_distributed() => Some(Arc::new(LocalCollective)),
            None => None,
        }
    }
}
