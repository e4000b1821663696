use std::collections::HashMap;

use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

/// 网络入口的声明：名字 + 形状（`None`表示该维度可变，通常是批维度）
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub name: String,
    pub shape: Vec<Option<usize>>,
}

impl Input {
    pub fn new(name: &str, shape: &[Option<usize>]) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
        }
    }

    /// 首维可变、其余维度固定的常见形式
    pub fn batched(name: &str, feature_shape: &[usize]) -> Self {
        let mut shape = vec![None];
        shape.extend(feature_shape.iter().map(|&d| Some(d)));
        Self::new(name, &shape)
    }

    /// 检查喂入的张量与声明的形状是否相容
    pub fn check(&self, tensor: &Tensor) -> Result<()> {
        let compatible = tensor.dimension() == self.shape.len()
            && self
                .shape
                .iter()
                .zip(tensor.shape())
                .all(|(expected, &got)| expected.is_none_or(|e| e == got));
        if compatible {
            Ok(())
        } else {
            Err(HapiError::InvalidArgument(format!(
                "输入`{}`期望的形状为{:?}，但得到{:?}",
                self.name,
                self.shape,
                tensor.shape()
            )))
        }
    }
}

/// `prepare`接受的输入声明：按位置给出的列表，或按`forward`参数名给出的映射
#[derive(Debug, Clone)]
pub enum InputSpec {
    List(Vec<Input>),
    Map(HashMap<String, Input>),
}

impl From<Input> for InputSpec {
    fn from(input: Input) -> Self {
        Self::List(vec![input])
    }
}

impl From<Vec<Input>> for InputSpec {
    fn from(inputs: Vec<Input>) -> Self {
        Self::List(inputs)
    }
}

impl InputSpec {
    /// 展开为位置顺序；映射形式按`names`（即`Network::input_names`）排列
    pub fn into_ordered(self, names: &[String]) -> Result<Vec<Input>> {
        match self {
            Self::List(inputs) => Ok(inputs),
            Self::Map(mut map) => names
                .iter()
                .map(|name| {
                    map.remove(name).ok_or_else(|| {
                        HapiError::InvalidArgument(format!("inputs 中缺少`forward`的参数`{name}`"))
                    })
                })
                .collect(),
        }
    }
}
