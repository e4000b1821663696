use rand::Rng;

use super::{Kernel, KernelContext};
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq)]
pub struct Relu;

impl Kernel for Relu {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(inputs[0].map(|x| x.max(0.)))
    }

    fn backward(
        &self,
        inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        let mask = inputs[0].map(|x| if x > 0. { 1. } else { 0. });
        Ok(vec![Some(grad * &mask)])
    }
}

/// backward: d(tanh)/dx = 1 - tanh²(x)
#[derive(Debug, Clone, PartialEq)]
pub struct Tanh;

impl Kernel for Tanh {
    fn name(&self) -> &'static str {
        "tanh"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(inputs[0].map(f32::tanh))
    }

    fn backward(
        &self,
        _inputs: &[&Tensor],
        output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad * &output.map(|y| 1. - y * y))])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sigmoid;

impl Kernel for Sigmoid {
    fn name(&self) -> &'static str {
        "sigmoid"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], _ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        Ok(inputs[0].map(|x| 1. / (1. + (-x).exp())))
    }

    fn backward(
        &self,
        _inputs: &[&Tensor],
        output: &Tensor,
        grad: &Tensor,
        _saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad * &output.map(|y| y * (1. - y)))])
    }
}

/// upscale_in_train 风格的 dropout：训练时保留的元素放大`1/(1-p)`，推理时原样输出
#[derive(Debug, Clone, PartialEq)]
pub struct Dropout {
    pub prob: f32,
}

impl Dropout {
    pub fn new(prob: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&prob) {
            return Err(HapiError::InvalidArgument(format!(
                "dropout 概率须在[0, 1)内，但得到{prob}"
            )));
        }
        Ok(Self { prob })
    }
}

impl Kernel for Dropout {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn forward(&self, inputs: &[&Tensor], ctx: &mut KernelContext<'_>) -> Result<Tensor> {
        if ctx.is_test || self.prob == 0. {
            return Ok(inputs[0].clone());
        }
        let keep = 1. - self.prob;
        let data = (0..inputs[0].size())
            .map(|_| {
                if ctx.rng.gen_range(0.0..1.0) < keep { 1. / keep } else { 0. }
            })
            .collect::<Vec<f32>>();
        let mask = Tensor::try_new(data, inputs[0].shape())?;
        let output = inputs[0] * &mask;
        ctx.saved = Some(mask);
        Ok(output)
    }

    fn backward(
        &self,
        _inputs: &[&Tensor],
        _output: &Tensor,
        grad: &Tensor,
        saved: Option<&Tensor>,
    ) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(match saved {
            Some(mask) => grad * mask,
            None => grad.clone(),
        })])
    }
}
