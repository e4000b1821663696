/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 动态图适配器：没有持久的程序，每一步都在记录带上即时执行。
 *                 训练：前向 -> 损失 -> 求和 ->（多进程时缩放损失）-> 反向 ->
 *                 （多进程时梯度 all-reduce）-> 优化器更新 -> 指标
 */

mod data_parallel;
mod tape;

use self::data_parallel::DataParallel;
use self::tape::Tape;
use super::{
    GraphAdapter, GraphKind, Mode, ModelState, StepOutput, gather_all, padding_keep,
    restore_parameters, translator_for, update_metrics, warn_unprepared_optimizer,
};
use crate::checkpoint::StateDict;
use crate::distributed::MergeCount;
use crate::engine::{Device, Emitter, ExecutionHandle, VarId};
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

pub struct DynamicGraphAdapter {
    mode: Mode,
    handle: Option<ExecutionHandle>,
    data_parallel: Option<DataParallel>,
    merge_count: MergeCount,
}

impl Default for DynamicGraphAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicGraphAdapter {
    pub fn new() -> Self {
        Self {
            mode: Mode::Train,
            handle: None,
            data_parallel: None,
            merge_count: MergeCount::default(),
        }
    }

    /// 已派发的算子总数
    pub fn dispatched(&self) -> usize {
        self.handle.as_ref().map_or(0, ExecutionHandle::dispatched)
    }
}

/// 把记录带上的变量截断到前`keep`个样本，返回新变量
fn trim_vars(tape: &mut Tape<'_>, vars: &[VarId], keep: usize) -> Result<Vec<VarId>> {
    vars.iter()
        .map(|&v| {
            let value = tape.value(v)?;
            let trimmed = value.slice_batch(keep.min(value.batch_size()))?;
            Ok(tape.feed(trimmed))
        })
        .collect()
}

impl GraphAdapter for DynamicGraphAdapter {
    fn kind(&self) -> GraphKind {
        GraphKind::Dynamic
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn prepare(&mut self, state: &mut ModelState) -> Result<()> {
        if let Some(optimizer) = state.optimizer.as_mut() {
            optimizer.core_mut().bind(GraphKind::Dynamic, &state.params);
        }
        self.handle = Some(ExecutionHandle::new(
            state.device.unwrap_or(Device::Cpu),
            state.seed,
        ));
        self.data_parallel = if state.nranks() > 1 {
            let collective = state.context.collective().ok_or_else(|| {
                HapiError::NotReady("多进程运行前须先初始化分布式上下文".to_string())
            })?;
            Some(DataParallel::new(collective))
        } else {
            None
        };
        Ok(())
    }

    fn train(&mut self, state: &mut ModelState, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput> {
        let optimizer = state
            .optimizer
            .as_mut()
            .ok_or_else(|| HapiError::NotReady("训练前须在 prepare 中设置优化器".to_string()))?;
        let loss_fn = state
            .loss
            .as_ref()
            .ok_or_else(|| HapiError::NotReady("训练前须在 prepare 中设置损失函数".to_string()))?;
        ModelState::check_feeds(&state.inputs, inputs, "输入")?;
        ModelState::check_feeds(&state.labels, labels, "标签")?;
        self.mode = Mode::Train;

        let collective = state.context.collective();
        let device = state.device.unwrap_or(Device::Cpu);
        let handle = self
            .handle
            .get_or_insert_with(|| ExecutionHandle::new(device, state.seed));

        let (losses, grads, metric_states) = {
            let mut tape = Tape::new(handle, &state.params, collective.as_deref(), false);
            let ins = inputs.iter().map(|t| tape.feed(t.clone())).collect::<Vec<_>>();
            let labs = labels.iter().map(|t| tape.feed(t.clone())).collect::<Vec<_>>();

            let outputs = state.network.forward(&mut tape, &ins)?;
            let loss_vars = loss_fn.compute(&mut tape, &outputs, &labs)?;
            let mut total = tape.sum(&loss_vars)?;
            if let Some(dp) = &self.data_parallel {
                total = dp.scale_loss(&mut tape, total)?;
            }
            let mut grads = tape.backward(total)?;
            if let Some(dp) = &self.data_parallel {
                grads = dp.apply_collective_grads(grads)?;
            }

            let metric_states = state
                .metrics
                .iter()
                .map(|m| {
                    let ids = m.add_metric_op(&mut tape, &outputs, &labs)?;
                    tape.values(&ids)
                })
                .collect::<Result<Vec<_>>>()?;
            (tape.values(&loss_vars)?, grads, metric_states)
        };

        optimizer.minimize(&mut state.params, &grads)?;
        Ok(StepOutput {
            losses,
            metrics: update_metrics(&mut state.metrics, metric_states)?,
        })
    }

    fn eval(&mut self, state: &mut ModelState, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput> {
        ModelState::check_feeds(&state.inputs, inputs, "输入")?;
        ModelState::check_feeds(&state.labels, labels, "标签")?;
        self.mode = Mode::Eval;

        let nranks = state.nranks();
        let collective = state.context.collective();
        let device = state.device.unwrap_or(Device::Cpu);
        let handle = self
            .handle
            .get_or_insert_with(|| ExecutionHandle::new(device, state.seed));

        let (losses, metric_states) = {
            let mut tape = Tape::new(handle, &state.params, collective.as_deref(), true);
            let ins = inputs.iter().map(|t| tape.feed(t.clone())).collect::<Vec<_>>();
            let labs = labels.iter().map(|t| tape.feed(t.clone())).collect::<Vec<_>>();

            let mut outputs = state.network.forward(&mut tape, &ins)?;
            let losses = match &state.loss {
                Some(loss) => {
                    let ids = loss.compute(&mut tape, &outputs, &labs)?;
                    tape.values(&ids)?
                }
                None => Vec::new(),
            };

            let mut metric_labels = labs;
            if nranks > 1 {
                outputs = gather_all(&mut tape, &outputs, nranks)?;
                metric_labels = gather_all(&mut tape, &metric_labels, nranks)?;
            }
            let samples = match outputs.first() {
                Some(&v) => tape.value(v)?.batch_size(),
                None => 0,
            };
            if let Some(keep) = padding_keep(state, &mut self.merge_count, Mode::Eval, samples) {
                outputs = trim_vars(&mut tape, &outputs, keep)?;
                metric_labels = trim_vars(&mut tape, &metric_labels, keep)?;
            }

            let metric_states = state
                .metrics
                .iter()
                .map(|m| {
                    let ids = m.add_metric_op(&mut tape, &outputs, &metric_labels)?;
                    tape.values(&ids)
                })
                .collect::<Result<Vec<_>>>()?;
            (losses, metric_states)
        };

        Ok(StepOutput {
            losses,
            metrics: update_metrics(&mut state.metrics, metric_states)?,
        })
    }

    fn test(&mut self, state: &mut ModelState, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        ModelState::check_feeds(&state.inputs, inputs, "输入")?;
        self.mode = Mode::Test;

        let nranks = state.nranks();
        let collective = state.context.collective();
        let device = state.device.unwrap_or(Device::Cpu);
        let handle = self
            .handle
            .get_or_insert_with(|| ExecutionHandle::new(device, state.seed));

        let mut tape = Tape::new(handle, &state.params, collective.as_deref(), true);
        let ins = inputs.iter().map(|t| tape.feed(t.clone())).collect::<Vec<_>>();
        let mut outputs = state.network.forward(&mut tape, &ins)?;
        // 动态图推理只在 GPU 上多进程运行时汇总各进程的输出
        if nranks > 1 && device.is_gpu() {
            outputs = gather_all(&mut tape, &outputs, nranks)?;
            let samples = match outputs.first() {
                Some(&v) => tape.value(v)?.batch_size(),
                None => 0,
            };
            if let Some(keep) = padding_keep(state, &mut self.merge_count, Mode::Test, samples) {
                outputs = trim_vars(&mut tape, &outputs, keep)?;
            }
        }
        tape.values(&outputs)
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
        if optimizer.core().graph_kind() != Some(GraphKind::Dynamic) {
            warn_unprepared_optimizer();
            return Ok(());
        }
        let translator = translator_for(&**optimizer);
        let converted = translator.to_dynamic(&optim, &optimizer.core().param_names());
        optimizer.set_dict(&converted)
    }

    fn merge_count(&self) -> &MergeCount {
        &self.merge_count
    }

    fn reset_merge_count(&mut self) {
        self.merge_count.reset();
    }
}
