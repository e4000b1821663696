use super::program::{Node, Program, VarSource};
use crate::engine::{Emitter, Kernel, Op, VarId};
use crate::errors::{HapiError, Result};
use crate::nn::ParameterStore;

/// 构建静态程序的`Emitter`：算子只被追加到程序中，不会执行
pub(crate) struct ProgramBuilder<'a> {
    program: &'a mut Program,
    params: &'a ParameterStore,
    is_test: bool,
}

impl<'a> ProgramBuilder<'a> {
    pub fn new(program: &'a mut Program, params: &'a ParameterStore, is_test: bool) -> Self {
        Self {
            program,
            params,
            is_test,
        }
    }

    /// 声明第`index`个喂入变量
    pub fn feed(&mut self, index: usize) -> VarId {
        self.program.new_var(VarSource::Feed(index))
    }
}

impl Emitter for ProgramBuilder<'_> {
    fn parameter(&mut self, name: &str) -> Result<VarId> {
        if let Some(&id) = self.program.params.get(name) {
            return Ok(id);
        }
        if !self.params.contains(name) {
            return Err(HapiError::InvalidArgument(format!("网络引用了未登记的参数`{name}`")));
        }
        let id = self.program.new_var(VarSource::Param(name.to_string()));
        self.program.params.insert(name.to_string(), id);
        Ok(id)
    }

    fn apply(&mut self, op: Op, inputs: &[VarId]) -> Result<VarId> {
        op.check_arity(inputs.len())?;
        if let Some(bad) = inputs.iter().find(|id| id.index() >= self.program.vars.len()) {
            return Err(HapiError::InvalidArgument(format!("程序中不存在变量{bad}")));
        }
        let output = self.program.new_var(VarSource::Temp);
        self.program.nodes.push(Node {
            op,
            inputs: inputs.to_vec(),
            output,
        });
        Ok(output)
    }

    fn is_test(&self) -> bool {
        self.is_test
    }
}
