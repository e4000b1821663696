/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : 各优化器共用的簿记：累积量的创建与命名、学习率计数器、
 *                 状态字典的导出与恢复
 *
 * 累积量命名在两种执行模式下不同：
 * - 静态图：`{参数名}_{[优化器名_]}{种类}_{n}`，n 来自每个优化器自己的名字计数；
 * - 动态图：`{参数名}_{唯一名}_{种类}_0`，唯一名在构造优化器时由进程级计数器生成。
 * 学习率计数器：静态图在每步开头（前置算子）自增后取值，动态图在更新之后自增，
 * 因此同一时刻动态图的计数总比静态图大 1。
 */

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use super::LearningRate;
use crate::adapter::GraphKind;
use crate::checkpoint::{
    DYNAMIC_COUNTER, LEARNING_RATE_PREFIX, RequiredVar, STATIC_COUNTER, StateDict, StateValue,
    VarRole,
};
use crate::errors::{HapiError, Result, TensorError};
use crate::nn::{Gradients, ParameterStore};
use crate::tensor::Tensor;

static UNIQUE_NAMES: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// 进程级唯一名：同一`key`依次得到`key_0`、`key_1`……
pub fn unique_name(key: &str) -> String {
    let mut names = UNIQUE_NAMES.lock();
    let counter = names.entry(key.to_string()).or_insert(0);
    let name = format!("{key}_{counter}");
    *counter += 1;
    name
}

/// 一种累积量的声明
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorSpec {
    pub kind: &'static str,
    /// 初始值
    pub fill: f32,
    /// 为 true 时形状为`[1]`，否则与参数同形
    pub scalar: bool,
}

impl AccumulatorSpec {
    pub const fn like_param(kind: &'static str) -> Self {
        Self {
            kind,
            fill: 0.,
            scalar: false,
        }
    }

    pub const fn scalar(kind: &'static str, fill: f32) -> Self {
        Self {
            kind,
            fill,
            scalar: true,
        }
    }

    fn shape(&self, param_shape: &[usize]) -> Vec<usize> {
        if self.scalar { vec![1] } else { param_shape.to_vec() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub var_name: String,
    pub value: Tensor,
}

/// 单个参数的更新规则。`slots`与优化器声明的`AccumulatorSpec`一一对应、顺序一致
pub trait UpdateRule {
    fn update(
        &self,
        param: &mut Tensor,
        grad: &Tensor,
        lr: f32,
        slots: &mut [Accumulator],
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct OptimizerCore {
    class_name: &'static str,
    name: Option<String>,
    unique_name: String,
    lr: LearningRate,
    specs: Vec<AccumulatorSpec>,
    kind: Option<GraphKind>,
    /// 已绑定的可训练参数（名字, 形状），按参数名有序
    params: Vec<(String, Vec<usize>)>,
    /// 参数名 -> 与`specs`顺序一致的累积量
    accumulators: BTreeMap<String, Vec<Accumulator>>,
    /// 静态图：前置算子已执行的次数；动态图：已完成的更新次数
    steps: i64,
    /// 静态图下固定学习率变量的名字
    lr_var: Option<String>,
    static_names: HashMap<String, usize>,
}

impl OptimizerCore {
    pub fn new(
        class_name: &'static str,
        name: Option<&str>,
        lr: LearningRate,
        specs: Vec<AccumulatorSpec>,
    ) -> Self {
        let unique_name = unique_name(name.unwrap_or(class_name));
        Self {
            class_name,
            name: name.map(str::to_string),
            unique_name,
            lr,
            specs,
            kind: None,
            params: Vec::new(),
            accumulators: BTreeMap::new(),
            steps: 0,
            lr_var: None,
            static_names: HashMap::new(),
        }
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn learning_rate(&self) -> &LearningRate {
        &self.lr
    }

    pub fn specs(&self) -> &[AccumulatorSpec] {
        &self.specs
    }

    /// 替换累积量声明，须在`bind`之前调用
    pub(crate) fn set_specs(&mut self, specs: Vec<AccumulatorSpec>) {
        self.specs = specs;
    }

    pub fn graph_kind(&self) -> Option<GraphKind> {
        self.kind
    }

    pub fn steps(&self) -> i64 {
        self.steps
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn accumulators(&self, param: &str) -> Option<&[Accumulator]> {
        self.accumulators.get(param).map(Vec::as_slice)
    }

    /// 当前这一步使用的学习率
    pub fn current_learning_rate(&self) -> f32 {
        match self.kind {
            Some(GraphKind::Static) => self.lr.value_at(self.steps - 1),
            _ => self.lr.value_at(self.steps),
        }
    }

    /// 静态图训练程序的前置算子：计数器自增
    pub fn advance_counter(&mut self) {
        self.steps += 1;
    }

    fn next_static_name(&mut self, key: &str) -> String {
        let counter = self.static_names.entry(key.to_string()).or_insert(0);
        let name = format!("{key}_{counter}");
        *counter += 1;
        name
    }

    fn accumulator_name(&mut self, param: &str, kind: &str) -> String {
        match self.kind {
            Some(GraphKind::Static) => {
                let key = match &self.name {
                    Some(name) => format!("{param}_{name}_{kind}"),
                    None => format!("{param}_{kind}"),
                };
                self.next_static_name(&key)
            }
            _ => format!("{param}_{}_{kind}_0", self.unique_name),
        }
    }

    /// 绑定到一组参数。静态图在构建程序时即创建全部累积量，动态图在首次更新时才创建
    pub fn bind(&mut self, kind: GraphKind, store: &ParameterStore) {
        self.kind = Some(kind);
        self.params = store
            .trainable()
            .map(|p| (p.name().to_string(), p.shape().to_vec()))
            .collect();
        self.accumulators.clear();
        self.static_names.clear();
        self.lr_var = None;
        if kind == GraphKind::Static {
            if !self.lr.is_scheduled() {
                let name = self.next_static_name(LEARNING_RATE_PREFIX.trim_end_matches('_'));
                self.lr_var = Some(name);
            }
            for (param, shape) in self.params.clone() {
                self.ensure_accumulators(&param, &shape);
            }
        }
    }

    fn ensure_accumulators(&mut self, param: &str, shape: &[usize]) {
        if self.accumulators.contains_key(param) {
            return;
        }
        let specs = self.specs.clone();
        let slots = specs
            .iter()
            .map(|spec| Accumulator {
                var_name: self.accumulator_name(param, spec.kind),
                value: Tensor::full(&spec.shape(shape), spec.fill),
            })
            .collect();
        self.accumulators.insert(param.to_string(), slots);
    }

    /// 用`rule`更新所有有梯度的已绑定参数
    pub fn apply_update<R: UpdateRule + ?Sized>(
        &mut self,
        rule: &R,
        store: &mut ParameterStore,
        grads: &Gradients,
    ) -> Result<()> {
        let kind = self
            .kind
            .ok_or_else(|| HapiError::NotReady("优化器尚未绑定参数".to_string()))?;
        let lr = self.current_learning_rate();
        for (param, shape) in self.params.clone() {
            let Some(grad) = grads.get(&param) else {
                continue;
            };
            if grad.shape() != shape.as_slice() {
                return Err(TensorError::IncompatibleShapes {
                    operator: "参数更新",
                    lhs: shape,
                    rhs: grad.shape().to_vec(),
                }
                .into());
            }
            self.ensure_accumulators(&param, &shape);
            let value = store
                .get_mut(&param)
                .and_then(|p| p.value_mut())
                .ok_or_else(|| HapiError::NotReady(format!("参数`{param}`尚未初始化")))?;
            let slots = self
                .accumulators
                .get_mut(&param)
                .map(Vec::as_mut_slice)
                .unwrap_or_default();
            rule.update(value, grad, lr, slots)?;
        }
        if kind == GraphKind::Dynamic {
            self.steps += 1;
        }
        Ok(())
    }

    /// 静态图下需要从检查点恢复的变量
    pub fn required_vars(&self) -> Vec<RequiredVar> {
        let mut vars = Vec::new();
        if self.lr.is_scheduled() {
            vars.push(RequiredVar {
                name: STATIC_COUNTER.to_string(),
                role: VarRole::Counter,
            });
        }
        if let Some(lr_var) = &self.lr_var {
            vars.push(RequiredVar {
                name: lr_var.clone(),
                role: VarRole::LearningRate,
            });
        }
        for (param, slots) in &self.accumulators {
            for (spec, slot) in self.specs.iter().zip(slots) {
                vars.push(RequiredVar {
                    name: slot.var_name.clone(),
                    role: VarRole::Accumulator {
                        param: param.clone(),
                        kind: spec.kind.to_string(),
                    },
                });
            }
        }
        vars
    }

    pub fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for slot in self.accumulators.values().flatten() {
            state.insert(slot.var_name.clone(), StateValue::Tensor(slot.value.clone()));
        }
        match self.kind {
            Some(GraphKind::Static) => {
                if self.lr.is_scheduled() {
                    state.insert(STATIC_COUNTER.to_string(), StateValue::Int(self.steps - 1));
                }
                if let (Some(lr_var), LearningRate::Fixed(lr)) = (&self.lr_var, &self.lr) {
                    state.insert(lr_var.clone(), StateValue::Float(f64::from(*lr)));
                }
            }
            Some(GraphKind::Dynamic) => {
                if self.lr.is_scheduled() {
                    state.insert(DYNAMIC_COUNTER.to_string(), StateValue::Int(self.steps));
                }
            }
            None => {}
        }
        state
    }

    /// 按当前模式的命名恢复状态（调用方负责先做跨模式转换）
    pub fn set_dict(&mut self, state: &StateDict) -> Result<()> {
        match self.kind {
            None => Err(HapiError::NotReady("优化器尚未绑定参数".to_string())),
            Some(GraphKind::Static) => self.set_static(state),
            Some(GraphKind::Dynamic) => self.set_dynamic(state),
        }
    }

    fn set_static(&mut self, state: &StateDict) -> Result<()> {
        for var in self.required_vars() {
            let value = state.get(&var.name);
            match var.role {
                VarRole::Counter => {
                    let value = value.ok_or_else(|| HapiError::OptimizerStateMismatch {
                        key: var.name.clone(),
                    })?;
                    let counter = value.as_int().ok_or_else(|| {
                        HapiError::Checkpoint(format!("{} 不是整数", var.name))
                    })?;
                    self.steps = counter + 1;
                }
                VarRole::LearningRate => {
                    if let Some(lr) = value.and_then(StateValue::as_float) {
                        self.lr = LearningRate::Fixed(lr as f32);
                    }
                }
                VarRole::Accumulator { param, .. } => {
                    let value = value.ok_or_else(|| HapiError::OptimizerStateMismatch {
                        key: var.name.clone(),
                    })?;
                    self.restore_slot(&param, &var.name, value)?;
                }
            }
        }
        Ok(())
    }

    fn set_dynamic(&mut self, state: &StateDict) -> Result<()> {
        if self.lr.is_scheduled() {
            let step = state
                .get(DYNAMIC_COUNTER)
                .ok_or_else(|| HapiError::OptimizerStateMismatch {
                    key: DYNAMIC_COUNTER.to_string(),
                })?;
            self.steps = step.as_int().ok_or_else(|| {
                HapiError::Checkpoint(format!("{DYNAMIC_COUNTER} 不是整数"))
            })?;
        }
        for (param, shape) in self.params.clone() {
            self.ensure_accumulators(&param, &shape);
            let names = self
                .accumulators
                .get(&param)
                .map(|slots| slots.iter().map(|s| s.var_name.clone()).collect::<Vec<_>>())
                .unwrap_or_default();
            for name in names {
                let value = state
                    .get(&name)
                    .ok_or_else(|| HapiError::OptimizerStateMismatch { key: name.clone() })?;
                self.restore_slot(&param, &name, value)?;
            }
        }
        Ok(())
    }

    fn restore_slot(&mut self, param: &str, var_name: &str, value: &StateValue) -> Result<()> {
        let slot = self
            .accumulators
            .get_mut(param)
            .and_then(|slots| slots.iter_mut().find(|s| s.var_name == var_name))
            .ok_or_else(|| HapiError::OptimizerStateMismatch {
                key: var_name.to_string(),
            })?;
        let tensor = value.as_tensor().ok_or_else(|| HapiError::ParameterMismatch {
            key: var_name.to_string(),
            expected: slot.value.shape().to_vec(),
            received: Some(value.shape()),
        })?;
        if tensor.shape() != slot.value.shape() {
            return Err(HapiError::ParameterMismatch {
                key: var_name.to_string(),
                expected: slot.value.shape().to_vec(),
                received: Some(tensor.shape().to_vec()),
            });
        }
        slot.value = tensor.clone();
        Ok(())
    }
}
