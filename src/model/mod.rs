/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 高层 Model：持有网络、参数与唯一的执行适配器。
 *                 适配器（静态图/动态图）在构造时按当前线程的设置选定，之后不再切换；
 *                 单步的 train/eval/test、检查点读写都委托给适配器，
 *                 fit/evaluate/predict 只负责组织循环
 */

mod fit;
mod options;

pub use fit::Logs;
pub use options::{DeviceArg, FitOptions, PrepareOptions};

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapter::{Adapter, GraphAdapter, GraphKind, Mode, ModelState, StepOutput};
use crate::checkpoint::{load_state, optimizer_path, params_path};
use crate::data::DataSource;
use crate::distributed::ParallelContext;
use crate::engine::Device;
use crate::errors::{HapiError, Result};
use crate::nn::{InputSpec, Network, Parameter};
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;

#[cfg(test)]
mod tests;

/// 未指定种子时参数初始化与执行句柄使用的种子
pub const DEFAULT_SEED: u64 = 42;

/// `Model::load`的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// 因缺失或形状不符而跳过的参数
    pub skipped: Vec<String>,
    /// 本次加载是否忽略了优化器状态（调用方要求，或有参数被跳过）
    pub reset_optimizer: bool,
}

pub struct Model {
    state: ModelState,
    adapter: Adapter,
}

impl Model {
    /// 按当前线程的动态图设置选择适配器，使用进程级的分布式上下文
    pub fn new(network: impl Network + 'static) -> Result<Self> {
        Self::with_kind(network, GraphKind::ambient(), ParallelContext::global())
    }

    pub fn with_kind(
        network: impl Network + 'static,
        kind: GraphKind,
        context: Arc<ParallelContext>,
    ) -> Result<Self> {
        Self::seeded(network, kind, context, DEFAULT_SEED)
    }

    pub fn seeded(
        network: impl Network + 'static,
        kind: GraphKind,
        context: Arc<ParallelContext>,
        seed: u64,
    ) -> Result<Self> {
        let mut state = ModelState::new(Box::new(network), context, seed)?;
        // 动态图没有启动程序，参数在构造时就地初始化
        if kind == GraphKind::Dynamic {
            let count = state.params.initialize_missing();
            debug!("动态图模型初始化了{count}个参数");
        }
        Ok(Self {
            state,
            adapter: Adapter::new(kind),
        })
    }

    /// 配置优化器、损失、指标、输入/标签声明与设备。
    ///
    /// 静态图要求给出`inputs`，设置了损失时还要求给出`labels`；
    /// 解析到 GPU 且多进程时初始化分布式上下文（进程内至多一次）；
    /// 最后交给适配器绑定优化器，静态图还会构建三种模式的程序。
    pub fn prepare(&mut self, options: PrepareOptions) -> Result<()> {
        let PrepareOptions {
            optimizer,
            loss,
            metrics,
            inputs,
            labels,
            device,
        } = options;
        let is_static = self.adapter.kind() == GraphKind::Static;

        let inputs = match inputs {
            Some(spec) => spec.into_ordered(&self.state.network.input_names())?,
            None if is_static => {
                return Err(HapiError::InvalidArgument(
                    "静态图模式下须给出 inputs".to_string(),
                ));
            }
            None => Vec::new(),
        };
        let labels = match labels {
            Some(InputSpec::List(labels)) => labels,
            Some(InputSpec::Map(_)) => {
                return Err(HapiError::InvalidArgument(
                    "labels 须为 Input 或 Input 列表".to_string(),
                ));
            }
            None if is_static && loss.is_some() => {
                return Err(HapiError::InvalidArgument(
                    "静态图模式下设置了损失函数时须给出 labels".to_string(),
                ));
            }
            None => Vec::new(),
        };

        let device = device.resolve(self.state.context.env().dev_id)?;
        if device.is_gpu() && self.state.nranks() > 1 {
            self.state.context.ensure_initialized(device)?;
        }

        self.state.optimizer = optimizer;
        self.state.loss = loss;
        self.state.metrics = metrics;
        self.state.inputs = inputs;
        self.state.labels = labels;
        self.state.device = Some(device);
        self.adapter.reset_merge_count();
        self.adapter.prepare(&mut self.state)
    }

    /// 一步训练：前向、反向并更新参数
    pub fn train_batch(&mut self, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput> {
        self.adapter.train(&mut self.state, inputs, labels)
    }

    pub fn eval_batch(&mut self, inputs: &[Tensor], labels: &[Tensor]) -> Result<StepOutput> {
        self.adapter.eval(&mut self.state, inputs, labels)
    }

    pub fn test_batch(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        self.adapter.test(&mut self.state, inputs)
    }

    /// 保存到`{path}.pdparams`（以及优化器有状态时的`{path}.pdopt`）。
    /// 只有 0 号进程真正写文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.state.context.local_rank() != 0 {
            return Ok(());
        }
        let path = path.as_ref();
        let text = path.to_string_lossy();
        if text.is_empty() || text.ends_with(['/', '\\']) || path.file_name().is_none() {
            return Err(HapiError::InvalidArgument(format!(
                "保存路径须以文件名前缀结尾，但得到`{text}`"
            )));
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        self.adapter.save(&self.state, path)
    }

    /// 从`{path}.pdparams`恢复参数，并（除非要求重置）从`{path}.pdopt`恢复优化器状态。
    ///
    /// 参数缺失或形状不符时默认报错；`skip_mismatch`为真时改为告警并跳过该参数，
    /// 同时强制忽略优化器状态。
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        skip_mismatch: bool,
        reset_optimizer: bool,
    ) -> Result<LoadReport> {
        let path = path.as_ref();
        let params_file = params_path(path);
        let saved = load_state(&params_file)?.ok_or_else(|| {
            HapiError::Checkpoint(format!("参数文件{}不存在", params_file.display()))
        })?;

        let mut report = LoadReport {
            skipped: Vec::new(),
            reset_optimizer,
        };
        let mut matched = Vec::new();
        for param in self.state.params.iter() {
            let received = saved.get(param.name()).and_then(|v| v.as_tensor());
            match received {
                Some(value) if value.shape() == param.shape() => {
                    matched.push((param.name().to_string(), value.clone()));
                }
                _ => {
                    let err = HapiError::ParameterMismatch {
                        key: param.name().to_string(),
                        expected: param.shape().to_vec(),
                        received: saved.get(param.name()).map(|v| v.shape()),
                    };
                    if !skip_mismatch {
                        return Err(err);
                    }
                    warn!("{err}，跳过该参数并忽略优化器状态");
                    report.skipped.push(param.name().to_string());
                    report.reset_optimizer = true;
                }
            }
        }

        let optim = if report.reset_optimizer {
            None
        } else {
            let optim_file = optimizer_path(path);
            let optim = load_state(&optim_file)?;
            if optim.is_none() && self.state.optimizer.is_some() {
                warn!("优化器状态文件{}不存在，跳过优化器状态的恢复", optim_file.display());
            }
            optim
        };
        self.adapter.load(&mut self.state, matched, optim)?;
        Ok(report)
    }

    pub fn parameters(&self) -> Vec<&Parameter> {
        self.adapter.parameters(&self.state)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.state.params.get(name)
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.state.optimizer.as_deref()
    }

    pub fn mode(&self) -> Mode {
        self.adapter.mode()
    }

    pub fn graph_kind(&self) -> GraphKind {
        self.adapter.kind()
    }

    /// prepare 解析出的设备
    pub fn device(&self) -> Option<Device> {
        self.state.device
    }

    /// 日志中的指标名：`loss`在前，随后是各指标的名字
    pub fn metrics_name(&self) -> Vec<String> {
        std::iter::once("loss".to_string())
            .chain(self.state.metrics.iter().flat_map(|m| m.name()))
            .collect()
    }

    pub fn reset_metrics(&mut self) {
        self.state.metrics.iter_mut().for_each(|m| m.reset());
    }

    /// 登记评估/推理数据的确切大小，分布式时据此剔除补齐样本
    pub fn set_eval_data(&mut self, data: &DataSource) {
        self.state.eval_data_size = data.dataset_len();
        self.adapter.reset_merge_count();
    }

    /// 最近一个评估/推理批次的有效样本数（剔除补齐后）
    pub fn effective_batch(&self, mode: Mode) -> usize {
        self.adapter.merge_count().effective_batch(mode)
    }
}
