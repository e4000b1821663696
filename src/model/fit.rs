/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 训练循环：fit / evaluate / predict。
 *                 每一轮内适配器只处于 train 或 eval 中的一种模式；
 *                 predict 对每个批次调用一次 test
 */

use std::collections::BTreeMap;
use tracing::info;

use super::{FitOptions, Model};
use crate::adapter::{GraphAdapter, Mode};
use crate::data::{Batch, DataLoader, DataSource};
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

/// 一轮结束时的日志：`loss`为最后一个批次各损失项的值，其余为各指标的累计值
pub type Logs = BTreeMap<String, Vec<f32>>;

/// 组织数据的方式
struct Batching {
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: u64,
}

impl Model {
    /// 训练`options.epochs`轮。
    ///
    /// 每`eval_freq`轮（从第 0 轮起）在`eval_data`上评估一次；设置了`save_dir`时，
    /// 每`save_freq`轮保存到`{save_dir}/{epoch}`，结束时保存到`{save_dir}/final`
    pub fn fit(
        &mut self,
        train_data: &DataSource,
        eval_data: Option<&DataSource>,
        options: &FitOptions,
    ) -> Result<()> {
        options.validate()?;
        let batching = Batching {
            batch_size: options.batch_size,
            shuffle: options.shuffle,
            drop_last: options.drop_last,
            seed: options.seed.unwrap_or(self.state.seed),
        };
        let step_log_freq = (options.verbose >= 2).then_some(options.log_freq);

        for epoch in 0..options.epochs {
            let batches = self.batches_of(train_data, &batching, epoch)?;
            let logs = self.run_one_epoch(batches, Mode::Train, step_log_freq, epoch)?;
            if options.verbose >= 1 {
                info!("Epoch {}/{}: {}", epoch + 1, options.epochs, format_logs(&logs));
            }

            if let Some(eval_data) = eval_data {
                if epoch % options.eval_freq == 0 {
                    let logs = self.evaluate_with(eval_data, options.batch_size, step_log_freq)?;
                    if options.verbose >= 1 {
                        info!("Eval after epoch {}: {}", epoch + 1, format_logs(&logs));
                    }
                }
            }

            if let Some(dir) = &options.save_dir {
                if epoch % options.save_freq == 0 {
                    self.save(dir.join(epoch.to_string()))?;
                }
            }
        }

        if let Some(dir) = &options.save_dir {
            self.save(dir.join("final"))?;
        }
        Ok(())
    }

    /// 在`eval_data`上评估一遍，返回`loss`与各指标名对应的值
    pub fn evaluate(&mut self, eval_data: &DataSource, batch_size: usize, log_freq: usize) -> Result<Logs> {
        self.evaluate_with(eval_data, batch_size, Some(log_freq))
    }

    fn evaluate_with(
        &mut self,
        eval_data: &DataSource,
        batch_size: usize,
        log_freq: Option<usize>,
    ) -> Result<Logs> {
        let batching = Batching {
            batch_size,
            shuffle: false,
            drop_last: false,
            seed: self.state.seed,
        };
        self.set_eval_data(eval_data);
        let batches = self.batches_of(eval_data, &batching, 0)?;
        self.run_one_epoch(batches, Mode::Eval, log_freq, 0)
    }

    /// 逐批推理，并把每个输出沿批维度拼接起来；
    /// 多进程且数据集大小已知时，结果截断到数据集大小
    pub fn predict(&mut self, test_data: &DataSource, batch_size: usize) -> Result<Vec<Tensor>> {
        let batching = Batching {
            batch_size,
            shuffle: false,
            drop_last: false,
            seed: self.state.seed,
        };
        self.set_eval_data(test_data);
        let batches = self.batches_of(test_data, &batching, 0)?;
        let n_inputs = self.input_count();

        let mut columns: Vec<Vec<Tensor>> = Vec::new();
        for batch in batches {
            let (inputs, _) = batch.split(n_inputs)?;
            let outputs = self.test_batch(&inputs)?;
            if columns.is_empty() {
                columns = vec![Vec::new(); outputs.len()];
            }
            for (column, output) in columns.iter_mut().zip(outputs) {
                column.push(output);
            }
        }

        let limit = test_data.dataset_len().filter(|_| self.state.nranks() > 1);
        columns
            .iter()
            .map(|column| -> Result<Tensor> {
                let refs = column.iter().collect::<Vec<_>>();
                let merged = Tensor::concat_batch(&refs)?;
                match limit {
                    Some(n) if n < merged.batch_size() => Ok(merged.slice_batch(n)?),
                    _ => Ok(merged),
                }
            })
            .collect()
    }

    /// 每个批次里属于输入的字段个数
    fn input_count(&self) -> usize {
        if !self.state.inputs.is_empty() {
            return self.state.inputs.len();
        }
        let names = self.state.network.input_names();
        if names.is_empty() { 1 } else { names.len() }
    }

    /// 本进程本轮要处理的批次
    fn batches_of(&self, source: &DataSource, batching: &Batching, epoch: usize) -> Result<Vec<Batch>> {
        let mut loader = match source {
            DataSource::Batches(batches) => return Ok(batches.clone()),
            DataSource::Loader(loader) => loader.clone(),
            DataSource::Dataset(dataset) => DataLoader::from_shared(
                dataset.clone(),
                batching.batch_size,
                self.state.nranks(),
                self.state.context.local_rank(),
            )?
            .shuffle(batching.shuffle)
            .seed(batching.seed)
            .drop_last(batching.drop_last),
        };
        loader.set_epoch(epoch as u64);
        loader.iter().collect()
    }

    fn run_one_epoch(
        &mut self,
        batches: Vec<Batch>,
        mode: Mode,
        log_freq: Option<usize>,
        epoch: usize,
    ) -> Result<Logs> {
        self.reset_metrics();
        self.adapter.reset_merge_count();
        let n_inputs = self.input_count();
        let steps = batches.len();
        let mut last_losses = Vec::new();

        for (step, batch) in batches.into_iter().enumerate() {
            let samples = batch.batch_size();
            let (inputs, labels) = batch.split(n_inputs)?;
            let output = match mode {
                Mode::Train => self.train_batch(&inputs, &labels)?,
                Mode::Eval => self.eval_batch(&inputs, &labels)?,
                Mode::Test => {
                    return Err(HapiError::InvalidArgument(
                        "推理请使用 predict".to_string(),
                    ));
                }
            };
            last_losses = output
                .losses
                .iter()
                .map(|t| t.number().unwrap_or_else(|| t.mean()))
                .collect();

            if let Some(freq) = log_freq.filter(|&f| f > 0) {
                if step % freq == 0 {
                    let effective = match self.effective_batch(mode) {
                        0 => samples,
                        n => n,
                    };
                    let mut logs = self.current_logs(&last_losses);
                    logs.insert("batch_size".to_string(), vec![effective as f32]);
                    info!(
                        "[{mode}] epoch {} step {}/{}: {}",
                        epoch + 1,
                        step + 1,
                        steps,
                        format_logs(&logs)
                    );
                }
            }
        }
        Ok(self.current_logs(&last_losses))
    }

    fn current_logs(&self, losses: &[f32]) -> Logs {
        let mut logs = Logs::new();
        if self.state.loss.is_some() {
            logs.insert("loss".to_string(), losses.to_vec());
        }
        for metric in &self.state.metrics {
            for (name, value) in metric.name().into_iter().zip(metric.accumulate()) {
                logs.insert(name, vec![value]);
            }
        }
        logs
    }
}

fn format_logs(logs: &Logs) -> String {
    logs.iter()
        .map(|(name, values)| {
            let values = values
                .iter()
                .map(|v| format!("{v:.4}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{name}: [{values}]")
        })
        .collect::<Vec<_>>()
        .join(" - ")
}
