mod checkpoint;
mod fit;
mod prepare;

use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::GraphKind;
use crate::distributed::ParallelContext;
use crate::model::{Model, PrepareOptions};
use crate::nn::{Input, Linear, MeanSquaredError};
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;

/// 单进程的`fc`（3 -> 1）回归模型，已 prepare
fn linear_model(kind: GraphKind, optimizer: impl Optimizer + 'static) -> Model {
    let mut model = Model::with_kind(Linear::new("fc", 3, 1), kind, Arc::new(ParallelContext::local())).unwrap();
    model
        .prepare(
            PrepareOptions::new()
                .optimizer(optimizer)
                .loss(MeanSquaredError::default())
                .inputs(Input::batched("x", &[3]))
                .labels(Input::batched("y", &[1]))
                .device("cpu"),
        )
        .unwrap();
    model
}

/// y = x0 - 2 * x1 + 0.5 * x2
fn regression_data(n: usize) -> (Tensor, Tensor) {
    let x = (0..n * 3)
        .map(|i| ((i * 7 % 11) as f32 - 5.) / 5.)
        .collect::<Vec<_>>();
    let y = x
        .chunks(3)
        .map(|r| r[0] - 2. * r[1] + 0.5 * r[2])
        .collect::<Vec<_>>();
    (Tensor::new(&x, &[n, 3]), Tensor::new(&y, &[n, 1]))
}

/// 测试专用的临时目录，调用方负责删除
fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hapi_model_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
