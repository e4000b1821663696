/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 参数与参数存储。参数以结构化名字（如`fc_0.w_0`）为键，
 *                 在两种执行模式下保持不变；共享权重只登记一次
 */

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;

use super::Init;
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

/// 参数名 -> 梯度
pub type Gradients = BTreeMap<String, Tensor>;

#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    shape: Vec<usize>,
    value: Option<Tensor>,
    init: Init,
    /// 登记顺序派生出的种子，使两种模式下同名参数的初始值一致
    seed: u64,
    pub stop_gradient: bool,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> Option<&mut Tensor> {
        self.value.as_mut()
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn init(&self) -> &Init {
        &self.init
    }

    fn initialize(&mut self) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.value = Some(self.init.generate_with_rng(&self.shape, &mut rng));
    }
}

#[derive(Debug, Clone)]
pub struct ParameterStore {
    params: BTreeMap<String, Parameter>,
    seed: u64,
}

impl ParameterStore {
    pub fn new(seed: u64) -> Self {
        Self {
            params: BTreeMap::new(),
            seed,
        }
    }

    /// 登记一个参数（尚未初始化）。同名参数再次登记时视为共享：
    /// 形状一致则直接复用已有条目，否则报错
    pub fn create(&mut self, name: &str, shape: &[usize], init: Init) -> Result<()> {
        if let Some(existing) = self.params.get(name) {
            if existing.shape != shape {
                return Err(HapiError::InvalidArgument(format!(
                    "参数`{name}`已以形状{:?}登记，不能再以形状{shape:?}共享",
                    existing.shape
                )));
            }
            return Ok(());
        }
        let seed = self.seed.wrapping_add(self.params.len() as u64);
        self.params.insert(
            name.to_string(),
            Parameter {
                name: name.to_string(),
                shape: shape.to_vec(),
                value: None,
                init,
                seed,
                stop_gradient: false,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// 取已初始化的参数值
    pub fn value(&self, name: &str) -> Result<&Tensor> {
        let param = self
            .params
            .get(name)
            .ok_or_else(|| HapiError::InvalidArgument(format!("参数`{name}`不存在")))?;
        param
            .value()
            .ok_or_else(|| HapiError::NotReady(format!("参数`{name}`尚未初始化")))
    }

    /// 覆盖参数值，形状须与登记的一致
    pub fn set_value(&mut self, name: &str, value: Tensor) -> Result<()> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| HapiError::InvalidArgument(format!("参数`{name}`不存在")))?;
        if value.shape() != param.shape() {
            return Err(HapiError::ParameterMismatch {
                key: name.to_string(),
                expected: param.shape.clone(),
                received: Some(value.shape().to_vec()),
            });
        }
        param.value = Some(value);
        Ok(())
    }

    pub fn set_stop_gradient(&mut self, name: &str, stop: bool) -> Result<()> {
        self.params
            .get_mut(name)
            .map(|p| p.stop_gradient = stop)
            .ok_or_else(|| HapiError::InvalidArgument(format!("参数`{name}`不存在")))
    }

    /// 初始化所有尚未初始化的参数，已有值的保持不变；返回本次初始化的个数
    pub fn initialize_missing(&mut self) -> usize {
        let mut count = 0;
        for param in self.params.values_mut().filter(|p| !p.is_initialized()) {
            param.initialize();
            count += 1;
        }
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    /// 需要训练（未设置 stop_gradient）的参数
    pub fn trainable(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values().filter(|p| !p.stop_gradient)
    }

    pub fn names(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
