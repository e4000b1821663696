/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Model 的配置：prepare 的选项（优化器、损失、指标、输入/标签声明、设备）
 *                 与 fit 的选项（可从 JSON 读取）
 */

use serde::Deserialize;
use std::path::PathBuf;

use crate::engine::Device;
use crate::errors::{HapiError, Result};
use crate::nn::{InputSpec, Loss, Metric};
use crate::optimizer::Optimizer;

/// 设备参数：显式设备优先，其次是设备名（大小写不敏感），否则自动检测
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceArg {
    #[default]
    Auto,
    Name(String),
    Device(Device),
}

impl DeviceArg {
    /// 解析为具体设备；`dev_id`为 GPU 时使用的编号
    pub fn resolve(&self, dev_id: usize) -> Result<Device> {
        match self {
            Self::Device(device) => Ok(*device),
            Self::Name(name) => match name.to_ascii_lowercase().as_str() {
                "gpu" => Ok(Device::Gpu(dev_id)),
                "cpu" => Ok(Device::Cpu),
                _ => Err(HapiError::InvalidArgument(format!(
                    "期望的设备为 cpu 或 gpu，但得到`{name}`"
                ))),
            },
            Self::Auto if Device::gpu_available() => Ok(Device::Gpu(dev_id)),
            Self::Auto => Ok(Device::Cpu),
        }
    }
}

impl From<Device> for DeviceArg {
    fn from(device: Device) -> Self {
        Self::Device(device)
    }
}

impl From<&str> for DeviceArg {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// `Model::prepare`的选项
///
/// # 示例
/// ```ignore
/// model.prepare(
///     PrepareOptions::new()
///         .optimizer(Momentum::new(0.1, 0.9))
///         .loss(CrossEntropy::default())
///         .metric(Accuracy::default())
///         .inputs(Input::batched("x", &[784]))
///         .labels(Input::batched("label", &[1]))
///         .device("gpu"),
/// )?;
/// ```
#[derive(Default)]
pub struct PrepareOptions {
    pub optimizer: Option<Box<dyn Optimizer>>,
    pub loss: Option<Box<dyn Loss>>,
    pub metrics: Vec<Box<dyn Metric>>,
    pub inputs: Option<InputSpec>,
    pub labels: Option<InputSpec>,
    pub device: DeviceArg,
}

impl PrepareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optimizer(mut self, optimizer: impl Optimizer + 'static) -> Self {
        self.optimizer = Some(Box::new(optimizer));
        self
    }

    pub fn loss(mut self, loss: impl Loss + 'static) -> Self {
        self.loss = Some(Box::new(loss));
        self
    }

    pub fn metric(mut self, metric: impl Metric + 'static) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }

    pub fn inputs(mut self, inputs: impl Into<InputSpec>) -> Self {
        self.inputs = Some(inputs.into());
        self
    }

    pub fn labels(mut self, labels: impl Into<InputSpec>) -> Self {
        self.labels = Some(labels.into());
        self
    }

    pub fn device(mut self, device: impl Into<DeviceArg>) -> Self {
        self.device = device.into();
        self
    }
}

/// `Model::fit`的选项
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub batch_size: usize,
    pub epochs: usize,
    /// 每隔多少轮评估一次
    pub eval_freq: usize,
    /// 每隔多少步打印一次日志
    pub log_freq: usize,
    /// 检查点目录；为空时不保存
    pub save_dir: Option<PathBuf>,
    /// 每隔多少轮保存一次
    pub save_freq: usize,
    /// 0：不打印；1：只在每轮结束时打印；2：另按`log_freq`逐步打印
    pub verbose: u8,
    pub drop_last: bool,
    pub shuffle: bool,
    /// 打乱数据用的种子，缺省时使用模型的种子
    pub seed: Option<u64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            epochs: 1,
            eval_freq: 1,
            log_freq: 10,
            save_dir: None,
            save_freq: 1,
            verbose: 2,
            drop_last: false,
            shuffle: true,
            seed: None,
        }
    }
}

impl FitOptions {
    /// 从 JSON 读取，未给出的字段取默认值
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("eval_freq", self.eval_freq),
            ("save_freq", self.save_freq),
        ];
        match positive.iter().find(|(_, v)| *v == 0) {
            Some((key, _)) => Err(HapiError::InvalidArgument(format!("{key} 须大于0"))),
            None => Ok(()),
        }
    }
}
