/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 执行适配层：同一个 Model 通过两种适配器之一运行训练、评估、推理与检查点读写。
 *                 - 静态图：每种模式先构建并缓存一个程序，之后反复执行；
 *                 - 动态图：每一步即时执行算子，显式地反向传播并应用梯度。
 *                 适配器在构造 Model 时选定，此后不再切换
 */

mod dynamic_graph;
mod static_graph;

pub use dynamic_graph::DynamicGraphAdapter;
pub use static_graph::StaticGraphAdapter;

use enum_dispatch::enum_dispatch;
use std::cell::Cell;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointTranslator, StateDict, StateValue, optimizer_path, params_path, save_state};
use crate::distributed::{MergeCount, ParallelContext};
use crate::engine::{Device, Emitter, VarId};
use crate::errors::{HapiError, Result};
use crate::nn::{Input, Loss, Metric, Network, Parameter, ParameterStore};
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;

#[cfg(test)]
mod tests;

/// 模型当前所处的阶段，任一时刻只有一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Eval,
    Test,
}

impl Mode {
    pub const ALL: [Self; 3] = [Self::Train, Self::Eval, Self::Test];

    pub const fn is_train(&self) -> bool {
        matches!(self, Self::Train)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Eval => write!(f, "eval"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// 执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphKind {
    Static,
    Dynamic,
}

thread_local! {
    static DYGRAPH: Cell<bool> = const { Cell::new(false) };
}

/// 之后在本线程构造的 Model 使用动态图
pub fn enable_dygraph() {
    DYGRAPH.with(|flag| flag.set(true));
}

pub fn disable_dygraph() {
    DYGRAPH.with(|flag| flag.set(false));
}

pub fn in_dygraph_mode() -> bool {
    DYGRAPH.with(Cell::get)
}

/// 作用域内启用动态图，离开作用域时恢复原先的设置
pub struct DygraphGuard {
    previous: bool,
}

pub fn dygraph_guard() -> DygraphGuard {
    let previous = in_dygraph_mode();
    enable_dygraph();
    DygraphGuard { previous }
}

impl Drop for DygraphGuard {
    fn drop(&mut self) {
        DYGRAPH.with(|flag| flag.set(self.previous));
    }
}

impl GraphKind {
    /// 当前线程的环境设置
    pub fn ambient() -> Self {
        if in_dygraph_mode() { Self::Dynamic } else { Self::Static }
    }
}

/// 适配器操作的模型状态（网络、参数、优化器、损失、指标以及 prepare 时的配置）
pub struct ModelState {
    pub(crate) network: Box<dyn Network>,
    pub(crate) params: ParameterStore,
    pub(crate) optimizer: Option<Box<dyn Optimizer>>,
    pub(crate) loss: Option<Box<dyn Loss>>,
    pub(crate) metrics: Vec<Box<dyn Metric>>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) labels: Vec<Input>,
    pub(crate) device: Option<Device>,
    pub(crate) context: Arc<ParallelContext>,
    pub(crate) seed: u64,
    /// 评估/推理数据集的确切大小；分布式时据此剔除补齐样本
    pub(crate) eval_data_size: Option<usize>,
}

impl ModelState {
    pub(crate) fn new(network: Box<dyn Network>, context: Arc<ParallelContext>, seed: u64) -> Result<Self> {
        let mut params = ParameterStore::new(seed);
        network.create_parameters(&mut params)?;
        Ok(Self {
            network,
            params,
            optimizer: None,
            loss: None,
            metrics: Vec::new(),
            inputs: Vec::new(),
            labels: Vec::new(),
            device: None,
            context,
            seed,
            eval_data_size: None,
        })
    }

    pub(crate) fn nranks(&self) -> usize {
        self.context.nranks()
    }

    /// 分布式评估/推理时需要剔除补齐样本的数据集大小
    fn padding_total(&self, mode: Mode) -> Option<usize> {
        if mode.is_train() || self.nranks() <= 1 {
            return None;
        }
        self.eval_data_size
    }

    fn check_feeds(specs: &[Input], tensors: &[Tensor], what: &str) -> Result<()> {
        if specs.is_empty() {
            return Ok(());
        }
        if specs.len() != tensors.len() {
            return Err(HapiError::InvalidArgument(format!(
                "声明了{}个{what}，但喂入了{}个",
                specs.len(),
                tensors.len()
            )));
        }
        specs
            .iter()
            .zip(tensors)
            .try_for_each(|(spec, tensor)| spec.check(tensor))
    }
}

/// 一步训练/评估的结果：每个损失项的值，以及每个指标在本批上的值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub losses: Vec<Tensor>,
    pub metrics: Vec<Vec<f32>>,
}

#[enum_dispatch]
pub enum Adapter {
    StaticGraphAdapter,
    DynamicGraphAdapter,
}

impl Adapter {
    pub fn new(kind: GraphKind) -> Self {
        match kind {
            GraphKind::Static => StaticGraphAdapter::new().into(),
            GraphKind::Dynamic => DynamicGraphAdapter::new().into(),
        }
    }
}

/// 两种适配器共同遵守的契约
#[enum_dispatch(Adapter)]
pub trait GraphAdapter {
    fn kind(&self) -> GraphKind;

    fn mode(&self) -> Mode;

    /// 绑定优化器、创建执行句柄；静态图还会构建并缓存三种模式的程序
    fn prepare(&mut self, state: &mut ModelState) -> Result<()>;

    /// 前向 + 反向 + 参数更新，须已设置优化器
    fn train(&mut self, state: &mut ModelState, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput>;

    /// 前向 +（若有）损失 + 指标，不更新参数
    fn eval(&mut self, state: &mut ModelState, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput>;

    /// 仅前向
    fn test(&mut self, state: &mut ModelState, inputs: &[Tensor]) -> Result<Vec<Tensor>>;

    fn save(&self, state: &ModelState, path: &Path) -> Result<()> {
        save_checkpoint(state, path)
    }

    /// 原地恢复参数；若给出优化器状态且已设置优化器，先转换命名再恢复
    fn load(
        &mut self,
        state: &mut ModelState,
        params: Vec<(String, Tensor)>,
        optim: Option<StateDict>,
    ) -> Result<()>;

    fn parameters<'a>(&self, state: &'a ModelState) -> Vec<&'a Parameter> {
        state.params.iter().collect()
    }

    fn merge_count(&self) -> &MergeCount;

    fn reset_merge_count(&mut self);
}

fn save_checkpoint(state: &ModelState, path: &Path) -> Result<()> {
    let mut params = StateDict::new();
    for param in state.params.iter() {
        let value = param.value().ok_or_else(|| {
            HapiError::NotReady(format!("参数`{}`尚未初始化，无法保存", param.name()))
        })?;
        params.insert(param.name().to_string(), StateValue::Tensor(value.clone()));
    }
    let params_file = params_path(path);
    debug!("保存参数到{}", params_file.display());
    save_state(&params_file, &params)?;

    if let Some(optimizer) = &state.optimizer {
        let optim = optimizer.state_dict();
        if !optim.is_empty() {
            let optim_file = optimizer_path(path);
            debug!("保存优化器状态到{}", optim_file.display());
            save_state(&optim_file, &optim)?;
        }
    }
    Ok(())
}

fn restore_parameters(state: &mut ModelState, params: Vec<(String, Tensor)>) -> Result<()> {
    params
        .into_iter()
        .try_for_each(|(name, value)| state.params.set_value(&name, value))
}

fn translator_for(optimizer: &dyn Optimizer) -> CheckpointTranslator {
    let core = optimizer.core();
    CheckpointTranslator::new(core.class_name(), core.name(), core.unique_name())
}

/// 分布式评估/推理时，按数据集大小剔除最后一批里的补齐样本。
/// `samples`为本批（汇总后）的样本数；未触发修正时返回`None`
fn padding_keep(state: &ModelState, merge: &mut MergeCount, mode: Mode, samples: usize) -> Option<usize> {
    let total = state.padding_total(mode)?;
    let keep = merge.advance(mode, samples, total);
    (keep < samples).then_some(keep)
}

fn gather_all(emitter: &mut dyn Emitter, vars: &[VarId], nranks: usize) -> Result<Vec<VarId>> {
    vars.iter().map(|&v| emitter.all_gather(v, nranks)).collect()
}

fn trim_batch(tensors: &[Tensor], keep: usize) -> Result<Vec<Tensor>> {
    tensors
        .iter()
        .map(|t| -> Result<Tensor> { Ok(t.slice_batch(keep.min(t.batch_size()))?) })
        .collect()
}

fn update_metrics(metrics: &mut [Box<dyn Metric>], states: Vec<Vec<Tensor>>) -> Result<Vec<Vec<f32>>> {
    metrics
        .iter_mut()
        .zip(states)
        .map(|(metric, states)| metric.update(&states))
        .collect()
}

fn warn_unprepared_optimizer() {
    warn!("优化器尚未绑定参数（模型未 prepare），跳过优化器状态的恢复");
}
