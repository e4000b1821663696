/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 静态程序的执行器。启动程序（初始化参数）每个执行器只跑一次；
 *                 训练程序执行完前向后沿记录反向传播，再把参数梯度交给优化器
 */

use tracing::debug;

use super::program::{CompiledPlan, Prepended, Program, VarSource};
use crate::distributed::Collective;
use crate::engine::{Device, ExecutionHandle, OpRecord, backward};
use crate::errors::{HapiError, Result};
use crate::nn::{Gradients, ParameterStore};
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;

pub(crate) struct Executor {
    handle: ExecutionHandle,
    started: bool,
    startup_runs: usize,
}

impl Executor {
    pub fn new(device: Device, seed: u64) -> Self {
        Self {
            handle: ExecutionHandle::new(device, seed),
            started: false,
            startup_runs: 0,
        }
    }

    /// 在新设备上重建执行器，沿用`previous`的启动状态
    pub fn rebuild(device: Device, seed: u64, previous: Option<Self>) -> Self {
        let mut executor = Self::new(device, seed);
        if let Some(previous) = previous {
            executor.started = previous.started;
            executor.startup_runs = previous.startup_runs;
        }
        executor
    }

    pub fn device(&self) -> Device {
        self.handle.device()
    }

    /// 启动程序实际执行的次数
    pub fn startup_runs(&self) -> usize {
        self.startup_runs
    }

    /// 一次性地初始化所有尚未初始化的参数（已有值的参数保持不变），返回本次初始化的个数
    pub fn run_startup(&mut self, params: &mut ParameterStore) -> usize {
        if self.started {
            return 0;
        }
        self.started = true;
        self.startup_runs += 1;
        let count = params.initialize_missing();
        debug!("启动程序初始化了{count}个参数，共{}个", params.len());
        count
    }

    /// 执行一个程序，返回按变量编号存放的结果（已释放的中间变量为`None`）
    pub fn run(
        &mut self,
        program: &Program,
        plan: Option<&CompiledPlan>,
        feeds: &[Tensor],
        params: &mut ParameterStore,
        mut optimizer: Option<&mut Box<dyn Optimizer>>,
        collective: Option<&dyn Collective>,
    ) -> Result<Vec<Option<Tensor>>> {
        for prepended in &program.prepended {
            match prepended {
                Prepended::IncrementCounter => {
                    if let Some(optimizer) = optimizer.as_mut() {
                        optimizer.core_mut().advance_counter();
                    }
                }
            }
        }

        let mut values = program
            .vars
            .iter()
            .map(|source| match source {
                VarSource::Feed(i) => feeds.get(*i).cloned().map(Some).ok_or_else(|| {
                    HapiError::InvalidArgument(format!("程序需要第{i}个喂入，但只喂入了{}个", feeds.len()))
                }),
                VarSource::Param(name) => Ok(Some(params.value(name)?.clone())),
                VarSource::Temp => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        let keep_records = program.minimize.is_some();
        let mut records = Vec::new();
        for (i, node) in program.nodes.iter().enumerate() {
            let (output, saved) = {
                let inputs = node
                    .inputs
                    .iter()
                    .map(|id| {
                        values
                            .get(id.index())
                            .and_then(Option::as_ref)
                            .ok_or_else(|| HapiError::NotReady(format!("{id}尚未计算或已被释放")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.handle
                    .dispatch(&node.op, &inputs, program.is_test, collective)?
            };
            values[node.output.index()] = Some(output);
            if keep_records {
                records.push(OpRecord {
                    op: node.op.clone(),
                    inputs: node.inputs.clone(),
                    output: node.output,
                    saved,
                });
            }
            if let Some(frees) = plan.and_then(|p| p.frees.get(i)) {
                for id in frees {
                    values[id.index()] = None;
                }
            }
        }

        if let Some(loss) = program.minimize {
            let optimizer = optimizer
                .ok_or_else(|| HapiError::NotReady("训练程序需要优化器".to_string()))?;
            let var_grads = backward(&records, &values, loss)?;
            let grads = params
                .trainable()
                .filter_map(|p| {
                    let id = program.params.get(p.name())?;
                    Some((p.name().to_string(), var_grads.get(id)?.clone()))
                })
                .collect::<Gradients>();
            optimizer.minimize(params, &grads)?;
        }
        Ok(values)
    }
}
