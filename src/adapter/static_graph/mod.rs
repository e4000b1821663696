/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 静态图适配器
 *
 * prepare 时为 train/eval/test 各构建一个程序并缓存：
 * 1. 复制基础程序，非训练模式去掉训练专用的前置操作；
 * 2. 调用网络的 forward 得到输出；
 * 3. 非 test 且设置了损失函数时加入损失；
 * 4. 多进程且非训练时，对输出（以及非 test 时的标签）做 all-gather；
 * 5. 非 test 时加入指标的状态算子；
 * 6. 训练模式把损失求和作为反向传播的起点，多进程时优化器先包一层梯度 all-reduce。
 * eval/test 程序最后克隆为推理模式；单进程时再编译出释放中间变量的执行计划。
 */

mod builder;
mod executor;
mod program;

use std::collections::HashMap;
use tracing::debug;

use self::builder::ProgramBuilder;
use self::executor::Executor;
use self::program::{CompiledPlan, Program};
use super::{
    GraphAdapter, GraphKind, Mode, ModelState, StepOutput, gather_all, padding_keep,
    restore_parameters, translator_for, trim_batch, update_metrics, warn_unprepared_optimizer,
};
use crate::checkpoint::StateDict;
use crate::distributed::MergeCount;
use crate::engine::{Device, Emitter, VarId};
use crate::errors::{HapiError, Result};
use crate::optimizer::CollectiveOptimizer;
use crate::tensor::Tensor;

struct CachedProgram {
    program: Program,
    plan: Option<CompiledPlan>,
}

/// 一次执行取回的结果
struct Fetched {
    losses: Vec<Tensor>,
    metric_states: Vec<Vec<Tensor>>,
    outputs: Vec<Tensor>,
}

pub struct StaticGraphAdapter {
    mode: Mode,
    programs: HashMap<Mode, CachedProgram>,
    executor: Option<Executor>,
    merge_count: MergeCount,
}

impl Default for StaticGraphAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticGraphAdapter {
    pub fn new() -> Self {
        Self {
            mode: Mode::Train,
            programs: HashMap::new(),
            executor: None,
            merge_count: MergeCount::default(),
        }
    }

    pub fn is_prepared(&self) -> bool {
        !self.programs.is_empty()
    }

    /// 启动程序实际执行的次数（至多一次）
    pub fn startup_runs(&self) -> usize {
        self.executor.as_ref().map_or(0, Executor::startup_runs)
    }

    /// 执行器所在的设备
    pub fn device(&self) -> Option<Device> {
        self.executor.as_ref().map(Executor::device)
    }

    /// 某模式程序的算子个数
    pub fn op_count(&self, mode: Mode) -> Option<usize> {
        self.programs.get(&mode).map(|c| c.program.nodes.len())
    }

    /// 某模式程序是否带有训练专用的前置操作
    pub fn has_prepended_ops(&self, mode: Mode) -> bool {
        self.programs
            .get(&mode)
            .is_some_and(|c| !c.program.prepended.is_empty())
    }

    /// 某模式程序是否为推理模式
    pub fn is_test_program(&self, mode: Mode) -> Option<bool> {
        self.programs.get(&mode).map(|c| c.program.is_test)
    }

    fn build_program(state: &ModelState, base: &Program, mode: Mode) -> Result<CachedProgram> {
        let nranks = state.nranks();
        let mut program = base.clone();
        if !mode.is_train() {
            program.strip_prepended();
        }

        let (inputs, labels, outputs, losses, metrics, minimize) = {
            let mut builder = ProgramBuilder::new(&mut program, &state.params, !mode.is_train());
            let inputs = (0..state.inputs.len())
                .map(|i| builder.feed(i))
                .collect::<Vec<_>>();
            let labels = if mode == Mode::Test {
                Vec::new()
            } else {
                (0..state.labels.len())
                    .map(|i| builder.feed(inputs.len() + i))
                    .collect::<Vec<_>>()
            };

            let mut outputs = state.network.forward(&mut builder, &inputs)?;
            let losses = match &state.loss {
                Some(loss) if mode != Mode::Test => loss.compute(&mut builder, &outputs, &labels)?,
                _ => Vec::new(),
            };

            let mut metric_labels = labels.clone();
            if nranks > 1 && !mode.is_train() {
                outputs = gather_all(&mut builder, &outputs, nranks)?;
                if mode != Mode::Test {
                    metric_labels = gather_all(&mut builder, &labels, nranks)?;
                }
            }

            let metrics = if mode == Mode::Test {
                Vec::new()
            } else {
                state
                    .metrics
                    .iter()
                    .map(|m| m.add_metric_op(&mut builder, &outputs, &metric_labels))
                    .collect::<Result<Vec<_>>>()?
            };

            let minimize = if mode.is_train() && !losses.is_empty() && state.optimizer.is_some() {
                Some(builder.sum(&losses)?)
            } else {
                None
            };
            (inputs, labels, outputs, losses, metrics, minimize)
        };

        program.inputs = inputs;
        program.labels = labels;
        program.outputs = outputs;
        program.losses = losses;
        program.metrics = metrics;
        program.minimize = minimize;

        let program = if mode.is_train() {
            program
        } else {
            program.clone_for_test()
        };
        let plan = (!mode.is_train() && nranks == 1).then(|| CompiledPlan::compile(&program));
        debug!(
            "构建{mode}程序：{}个变量，{}个算子",
            program.vars.len(),
            program.nodes.len()
        );
        Ok(CachedProgram { program, plan })
    }

    fn run(
        &mut self,
        state: &mut ModelState,
        mode: Mode,
        inputs: &[Tensor],
        labels: &[Tensor],
    ) -> Result<Fetched> {
        self.mode = mode;
        let cached = self
            .programs
            .get(&mode)
            .ok_or_else(|| HapiError::NotReady(format!("{mode}程序尚未构建，请先调用 prepare")))?;
        let executor = self
            .executor
            .as_mut()
            .ok_or_else(|| HapiError::NotReady("执行器尚未创建，请先调用 prepare".to_string()))?;

        ModelState::check_feeds(&state.inputs, inputs, "输入")?;
        let mut feeds = inputs.to_vec();
        if mode != Mode::Test {
            ModelState::check_feeds(&state.labels, labels, "标签")?;
            feeds.extend_from_slice(labels);
        }

        let collective = state.context.collective();
        let values = executor.run(
            &cached.program,
            cached.plan.as_ref(),
            &feeds,
            &mut state.params,
            state.optimizer.as_mut(),
            collective.as_deref(),
        )?;

        let fetch = |ids: &[VarId]| -> Result<Vec<Tensor>> {
            ids.iter()
                .map(|id| {
                    values
                        .get(id.index())
                        .cloned()
                        .flatten()
                        .ok_or_else(|| HapiError::NotReady(format!("取回{id}失败")))
                })
                .collect()
        };
        let losses = fetch(&cached.program.losses)?;
        let mut outputs = fetch(&cached.program.outputs)?;
        let mut metric_states = cached
            .program
            .metrics
            .iter()
            .map(|ids| fetch(ids))
            .collect::<Result<Vec<_>>>()?;

        let samples = outputs.first().map_or(0, Tensor::batch_size);
        if let Some(keep) = padding_keep(state, &mut self.merge_count, mode, samples) {
            outputs = trim_batch(&outputs, keep)?;
            metric_states = metric_states
                .iter()
                .map(|states| trim_batch(states, keep))
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(Fetched {
            losses,
            metric_states,
            outputs,
        })
    }
}

impl GraphAdapter for StaticGraphAdapter {
    fn kind(&self) -> GraphKind {
        GraphKind::Static
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn prepare(&mut self, state: &mut ModelState) -> Result<()> {
        let lr_scheduled = state
            .optimizer
            .as_ref()
            .is_some_and(|o| o.core().learning_rate().is_scheduled());
        if let Some(optimizer) = state.optimizer.as_mut() {
            optimizer.core_mut().bind(GraphKind::Static, &state.params);
        }
        if state.nranks() > 1 && state.optimizer.is_some() {
            let collective = state.context.collective().ok_or_else(|| {
                HapiError::NotReady("多进程训练前须先初始化分布式上下文".to_string())
            })?;
            if let Some(inner) = state.optimizer.take() {
                state.optimizer = Some(Box::new(CollectiveOptimizer::new(inner, collective)));
            }
        }

        let base = Program::base(lr_scheduled);
        let mut programs = HashMap::new();
        for mode in Mode::ALL {
            programs.insert(mode, Self::build_program(state, &base, mode)?);
        }
        self.programs = programs;

        let device = state.device.unwrap_or(Device::Cpu);
        let previous = self.executor.take();
        let executor = self
            .executor
            .insert(Executor::rebuild(device, state.seed, previous));
        debug!("静态图执行器位于{}", executor.device());
        executor.run_startup(&mut state.params);
        Ok(())
    }

    fn train(&mut self, state: &mut ModelState, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput> {
        if state.optimizer.is_none() {
            return Err(HapiError::NotReady("训练前须在 prepare 中设置优化器".to_string()));
        }
        if state.loss.is_none() {
            return Err(HapiError::NotReady("训练前须在 prepare 中设置损失函数".to_string()));
        }
        let fetched = self.run(state, Mode::Train, inputs, labels)?;
        Ok(StepOutput {
            losses: fetched.losses,
            metrics: update_metrics(&mut state.metrics, fetched.metric_states)?,
        })
    }

    fn eval(&mut self, state: &mut ModelState, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput> {
        let fetched = self.run(state, Mode::Eval, inputs, labels)?;
        Ok(StepOutput {
            losses: fetched.losses,
            metrics: update_metrics(&mut state.metrics, fetched.metric_states)?,
        })
    }

    fn test(&mut self, state: &mut ModelState, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok(self.run(state, Mode::Test, inputs, &[])?.outputs)
    }

    fn load(
        &mut self,
        state: &mut ModelState,
        params: Vec<(String, Tensor)>,
        optim: Option<StateDict>,
    ) -> Result<()> {
        restore_parameters(state, params)?;
        let (Some(optim), Some(optimizer)) = (optim, state.optimizer.as_mut()) else {
            return Ok(());
        };
        if optim.is_empty() {
            return Ok(());
        }
        if optimizer.core().graph_kind() != Some(GraphKind::Static) {
            warn_unprepared_optimizer();
            return Ok(());
        }
        let translator = translator_for(&**optimizer);
        let converted = translator.to_static(&optim, &optimizer.core().required_vars())?;
        optimizer.set_dict(&converted)
    }

    fn merge_count(&self) -> &MergeCount {
        &self.merge_count
    }

    fn reset_merge_count(&mut self) {
        self.merge_count.reset();
    }
}
