/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 动态图记录带：算子在发出时立即执行，训练时同时留下记录以便反向传播
 */

use std::collections::BTreeMap;

use crate::distributed::Collective;
use crate::engine::{Emitter, ExecutionHandle, Op, OpRecord, VarId, backward};
use crate::errors::{HapiError, Result};
use crate::nn::{Gradients, ParameterStore};
use crate::tensor::Tensor;

pub(crate) struct Tape<'a> {
    handle: &'a mut ExecutionHandle,
    params: &'a ParameterStore,
    collective: Option<&'a dyn Collective>,
    is_test: bool,
    values: Vec<Tensor>,
    records: Vec<OpRecord>,
    param_vars: BTreeMap<String, VarId>,
}

impl<'a> Tape<'a> {
    pub fn new(
        handle: &'a mut ExecutionHandle,
        params: &'a ParameterStore,
        collective: Option<&'a dyn Collective>,
        is_test: bool,
    ) -> Self {
        Self {
            handle,
            params,
            collective,
            is_test,
            values: Vec::new(),
            records: Vec::new(),
            param_vars: BTreeMap::new(),
        }
    }

    /// 把主机上的张量登记为一个变量
    pub fn feed(&mut self, tensor: Tensor) -> VarId {
        self.values.push(tensor);
        VarId(self.values.len() - 1)
    }

    pub fn value(&self, id: VarId) -> Result<&Tensor> {
        self.values
            .get(id.index())
            .ok_or_else(|| HapiError::InvalidArgument(format!("记录带中不存在变量{id}")))
    }

    pub fn values(&self, ids: &[VarId]) -> Result<Vec<Tensor>> {
        ids.iter().map(|&id| self.value(id).cloned()).collect()
    }

    /// 从`loss`反向传播，返回可训练参数的梯度
    pub fn backward(&self, loss: VarId) -> Result<Gradients> {
        let values = self.values.iter().cloned().map(Some).collect::<Vec<_>>();
        let var_grads = backward(&self.records, &values, loss)?;
        Ok(self
            .params
            .trainable()
            .filter_map(|p| {
                let id = self.param_vars.get(p.name())?;
                Some((p.name().to_string(), var_grads.get(id)?.clone()))
            })
            .collect())
    }
}

impl Emitter for Tape<'_> {
    fn parameter(&mut self, name: &str) -> Result<VarId> {
        if let Some(&id) = self.param_vars.get(name) {
            return Ok(id);
        }
        let value = self.params.value(name)?.clone();
        let id = self.feed(value);
        self.param_vars.insert(name.to_string(), id);
        Ok(id)
    }

    fn apply(&mut self, op: Op, inputs: &[VarId]) -> Result<VarId> {
        let (output, saved) = {
            let values = &self.values;
            let tensors = inputs
                .iter()
                .map(|&id| {
                    values
                        .get(id.index())
                        .ok_or_else(|| HapiError::InvalidArgument(format!("记录带中不存在变量{id}")))
                })
                .collect::<Result<Vec<_>>>()?;
            self.handle
                .dispatch(&op, &tensors, self.is_test, self.collective)?
        };
        let id = self.feed(output);
        if !self.is_test {
            self.records.push(OpRecord {
                op,
                inputs: inputs.to_vec(),
                output: id,
                saved,
            });
        }
        Ok(id)
    }

    fn is_test(&self) -> bool {
        self.is_test
    }
}
