/*
 * @Author       : 老董
 * @Date         : 2026-02-03
 * @Description  : 张量的四则运算。张量与张量之间支持 NumPy 风格的广播；
 *                 张量与纯数（f32）之间则把纯数广播到每个元素上。
 *                 广播失败会 panic，需要可恢复错误的场景（算子内核）请先用
 *                 `Tensor::broadcast_shape` 校验。
 */

use super::Tensor;
use crate::errors::TensorError;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

macro_rules! impl_tensor_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                Tensor::from_array(&self.data $op &rhs.data)
            }
        }
        impl $trait<Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                &self $op &rhs
            }
        }
        impl $trait<&Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                &self $op rhs
            }
        }
        impl $trait<f32> for &Tensor {
            type Output = Tensor;
            fn $method(self, scalar: f32) -> Tensor {
                Tensor::from_array(&self.data $op scalar)
            }
        }
        impl $trait<f32> for Tensor {
            type Output = Tensor;
            fn $method(self, scalar: f32) -> Tensor {
                &self $op scalar
            }
        }
        impl $trait<&Tensor> for f32 {
            type Output = Tensor;
            fn $method(self, tensor: &Tensor) -> Tensor {
                Tensor::from_array(self $op &tensor.data)
            }
        }
    };
}

impl_tensor_binary_op!(Add, add, +);
impl_tensor_binary_op!(Sub, sub, -);
impl_tensor_binary_op!(Mul, mul, *);
impl_tensor_binary_op!(Div, div, /);

impl Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        self.map(|x| -x)
    }
}

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, rhs: &Tensor) {
        self.data += &rhs.data;
    }
}

impl SubAssign<&Tensor> for Tensor {
    fn sub_assign(&mut self, rhs: &Tensor) {
        self.data -= &rhs.data;
    }
}

impl MulAssign<f32> for Tensor {
    fn mul_assign(&mut self, scalar: f32) {
        self.data *= scalar;
    }
}

impl Tensor {
    /// 两个形状按 NumPy 规则广播后的形状，不可广播时返回错误
    pub fn broadcast_shape(
        operator: &'static str,
        lhs: &[usize],
        rhs: &[usize],
    ) -> Result<Vec<usize>, TensorError> {
        let ndim = lhs.len().max(rhs.len());
        let mut shape = vec![0; ndim];
        for i in 0..ndim {
            let l = if i < ndim - lhs.len() { 1 } else { lhs[i - (ndim - lhs.len())] };
            let r = if i < ndim - rhs.len() { 1 } else { rhs[i - (ndim - rhs.len())] };
            shape[i] = match (l, r) {
                (l, r) if l == r => l,
                (1, r) => r,
                (l, 1) => l,
                _ => {
                    return Err(TensorError::IncompatibleShapes {
                        operator,
                        lhs: lhs.to_vec(),
                        rhs: rhs.to_vec(),
                    });
                }
            };
        }
        Ok(shape)
    }
}
