use std::fs;
use std::sync::Arc;

use super::{linear_model, regression_data, temp_dir};
use crate::adapter::{GraphKind, Mode};
use crate::checkpoint::params_path;
use crate::data::{Batch, DataSource, TensorDataset};
use crate::distributed::ParallelContext;
use crate::errors::HapiError;
use crate::model::{FitOptions, Model, PrepareOptions};
use crate::nn::{Accuracy, CrossEntropy, Mlp};
use crate::optimizer::Sgd;
use crate::tensor::Tensor;

fn quiet(epochs: usize, batch_size: usize) -> FitOptions {
    FitOptions {
        epochs,
        batch_size,
        verbose: 0,
        ..FitOptions::default()
    }
}

fn regression_source(n: usize) -> DataSource {
    let (x, y) = regression_data(n);
    DataSource::dataset(TensorDataset::pair(x, y).unwrap())
}

#[test]
fn test_fit_reduces_loss() {
    let mut model = linear_model(GraphKind::Dynamic, Sgd::new(0.1));
    let data = regression_source(32);
    let before = model.evaluate(&data, 8, 10).unwrap()["loss"][0];
    model.fit(&data, None, &quiet(20, 8)).unwrap();
    let after = model.evaluate(&data, 8, 10).unwrap()["loss"][0];
    assert!(after < before, "loss 应下降：{before} -> {after}");
    assert_eq!(model.mode(), Mode::Eval);
}

#[test]
fn test_fit_saves_every_epoch_and_final() {
    let dir = temp_dir("fit_save");
    let mut model = linear_model(GraphKind::Static, Sgd::new(0.1));
    let options = FitOptions {
        save_dir: Some(dir.clone()),
        ..quiet(2, 4)
    };
    model.fit(&regression_source(8), None, &options).unwrap();
    for name in ["0", "1", "final"] {
        assert!(params_path(&dir.join(name)).exists(), "缺少检查点{name}");
    }
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_fit_with_eval_data() {
    let mut model = linear_model(GraphKind::Static, Sgd::new(0.05));
    let options = FitOptions {
        eval_freq: 2,
        ..quiet(3, 4)
    };
    model
        .fit(&regression_source(8), Some(&regression_source(6)), &options)
        .unwrap();
    // 最后一轮（第 2 轮）之后做了评估
    assert_eq!(model.mode(), Mode::Eval);
}

#[test]
fn test_fit_accepts_paired_batches() {
    let mut model = linear_model(GraphKind::Dynamic, Sgd::new(0.1));
    let before = model.parameter("fc.w_0").unwrap().value().cloned();
    let (x, y) = regression_data(4);
    let data = DataSource::from(vec![Batch::from((x, y))]);
    model.fit(&data, None, &quiet(1, 4)).unwrap();
    assert_ne!(model.parameter("fc.w_0").unwrap().value().cloned(), before);
}

#[test]
fn test_fit_rejects_zero_frequency() {
    let mut model = linear_model(GraphKind::Dynamic, Sgd::new(0.1));
    let options = FitOptions {
        save_freq: 0,
        ..quiet(1, 4)
    };
    let err = model.fit(&regression_source(4), None, &options).unwrap_err();
    assert!(matches!(err, HapiError::InvalidArgument(_)));
}

#[test]
fn test_evaluate_reports_loss_and_metrics() {
    let mut model = Model::with_kind(
        Mlp::new(&[2, 3]).unwrap(),
        GraphKind::Dynamic,
        Arc::new(ParallelContext::local()),
    )
    .unwrap();
    model
        .prepare(
            PrepareOptions::new()
                .loss(CrossEntropy::default())
                .metric(Accuracy::default()),
        )
        .unwrap();
    let x = Tensor::new(&[1., 0., 0., 1., 1., 1., -1., 0., 0., -1.], &[5, 2]);
    let y = Tensor::new(&[0., 1., 2., 0., 1.], &[5, 1]);
    let logs = model
        .evaluate(&DataSource::dataset(TensorDataset::pair(x, y).unwrap()), 2, 1)
        .unwrap();

    assert_eq!(logs.keys().collect::<Vec<_>>(), vec!["acc", "loss"]);
    assert!((0.0..=1.0).contains(&logs["acc"][0]));
    assert!(logs["loss"][0].is_finite());
}

#[test]
fn test_predict_concatenates_batches() {
    let mut model = linear_model(GraphKind::Static, Sgd::new(0.1));
    let outputs = model.predict(&regression_source(5), 2).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].shape(), &[5, 1]);
    assert_eq!(model.mode(), Mode::Test);
}
