/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : Linear（全连接）层与由其堆叠而成的多层感知机
 */

use super::{Init, Network, ParameterStore};
use crate::engine::{Emitter, VarId};
use crate::errors::{HapiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn emit(self, emitter: &mut dyn Emitter, x: VarId) -> Result<VarId> {
        match self {
            Self::Relu => emitter.relu(x),
            Self::Tanh => emitter.tanh(x),
            Self::Sigmoid => emitter.sigmoid(x),
        }
    }
}

/// Linear (全连接) 层：`output = x @ W + b`
///
/// # 输入/输出形状
/// - 输入：[batch_size, in_features]
/// - 输出：[batch_size, out_features]
///
/// 参数名为`{name}.w_0`（[in_features, out_features]）与`{name}.b_0`（[out_features]）
#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    in_features: usize,
    out_features: usize,
    activation: Option<Activation>,
}

impl Linear {
    pub fn new(name: &str, in_features: usize, out_features: usize) -> Self {
        Self {
            name: name.to_string(),
            in_features,
            out_features,
            activation: None,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn weight_name(&self) -> String {
        format!("{}.w_0", self.name)
    }

    pub fn bias_name(&self) -> String {
        format!("{}.b_0", self.name)
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// 对单个输入变量应用本层
    pub fn apply(&self, emitter: &mut dyn Emitter, x: VarId) -> Result<VarId> {
        let w = emitter.parameter(&self.weight_name())?;
        let b = emitter.parameter(&self.bias_name())?;
        let xw = emitter.mat_mul(x, w)?;
        let y = emitter.add(xw, b)?;
        match self.activation {
            Some(act) => act.emit(emitter, y),
            None => Ok(y),
        }
    }
}

impl Network for Linear {
    fn create_parameters(&self, store: &mut ParameterStore) -> Result<()> {
        store.create(
            &self.weight_name(),
            &[self.in_features, self.out_features],
            Init::Xavier,
        )?;
        store.create(&self.bias_name(), &[self.out_features], Init::Zeros)
    }

    fn forward(&self, emitter: &mut dyn Emitter, inputs: &[VarId]) -> Result<Vec<VarId>> {
        let [x] = inputs else {
            return Err(HapiError::InvalidArgument(format!(
                "Linear 只接受1个输入，但得到{}个",
                inputs.len()
            )));
        };
        Ok(vec![self.apply(emitter, *x)?])
    }

    fn input_names(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
}

/// 多层感知机：各层依次命名为`fc_0`、`fc_1`……，隐藏层使用激活函数，
/// 可选地在每个隐藏层后接 dropout
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Linear>,
    dropout: Option<f32>,
}

impl Mlp {
    /// `sizes`形如`[输入维度, 隐藏层..., 输出维度]`
    pub fn new(sizes: &[usize]) -> Result<Self> {
        Self::with_activation(sizes, Activation::Relu)
    }

    pub fn with_activation(sizes: &[usize], activation: Activation) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(HapiError::InvalidArgument(format!(
                "Mlp 至少需要输入与输出两个维度，但得到{sizes:?}"
            )));
        }
        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let layer = Linear::new(&format!("fc_{i}"), pair[0], pair[1]);
                if i < last { layer.with_activation(activation) } else { layer }
            })
            .collect();
        Ok(Self {
            layers,
            dropout: None,
        })
    }

    pub fn with_dropout(mut self, prob: f32) -> Self {
        self.dropout = Some(prob);
        self
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }
}

impl Network for Mlp {
    fn create_parameters(&self, store: &mut ParameterStore) -> Result<()> {
        self.layers
            .iter()
            .try_for_each(|layer| layer.create_parameters(store))
    }

    fn forward(&self, emitter: &mut dyn Emitter, inputs: &[VarId]) -> Result<Vec<VarId>> {
        let [x] = inputs else {
            return Err(HapiError::InvalidArgument(format!(
                "Mlp 只接受1个输入，但得到{}个",
                inputs.len()
            )));
        };
        let mut h = *x;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.apply(emitter, h)?;
            if let (Some(prob), true) = (self.dropout, i < last) {
                h = emitter.dropout(h, prob)?;
            }
        }
        Ok(vec![h])
    }

    fn input_names(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
}
