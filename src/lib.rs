//! # Hapi Core
//!
//! `hapi_core`是一个高层训练 API 的执行核心：同一个[`Model`]既能以静态图方式
//! （先构建程序、再反复执行）运行，也能以动态图方式（逐个算子即时执行）运行，
//! 两种方式下的训练/评估/推理、分布式同步以及检查点读写保持一致。
//!
//! ```ignore
//! use hapi_core::prelude::*;
//!
//! let mut model = Model::new(Mlp::new(&[784, 128, 10])?)?;
//! model.prepare(
//!     PrepareOptions::new()
//!         .optimizer(Momentum::new(0.1, 0.9))
//!         .loss(CrossEntropy::default())
//!         .metric(Accuracy::default())
//!         .inputs(Input::batched("image", &[784]))
//!         .labels(Input::batched("label", &[1])),
//! )?;
//! model.fit(&train, Some(&eval), &FitOptions::default())?;
//! model.save("checkpoints/mnist")?;
//! ```

pub mod adapter;
pub mod checkpoint;
pub mod data;
pub mod distributed;
pub mod engine;
pub mod errors;
pub mod model;
pub mod nn;
pub mod optimizer;
pub mod tensor;

pub use adapter::{GraphKind, Mode, StepOutput, disable_dygraph, dygraph_guard, enable_dygraph, in_dygraph_mode};
pub use errors::{HapiError, Result};
pub use model::{DeviceArg, FitOptions, LoadReport, Model, PrepareOptions};
pub use tensor::Tensor;

/// 常用类型
pub mod prelude {
    pub use crate::adapter::{GraphKind, Mode, dygraph_guard};
    pub use crate::data::{Batch, DataLoader, DataSource, Dataset, TensorDataset};
    pub use crate::distributed::{ParallelContext, ParallelEnv};
    pub use crate::engine::Device;
    pub use crate::model::{DeviceArg, FitOptions, Model, PrepareOptions};
    pub use crate::nn::{Accuracy, CrossEntropy, Input, Linear, MeanSquaredError, Mlp, Network};
    pub use crate::optimizer::{Adam, LearningRate, Momentum, Optimizer, Sgd};
    pub use crate::tensor::Tensor;
}
