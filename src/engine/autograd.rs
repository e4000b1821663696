/*
 * @Author       : 老董
 * @Date         : 2026-02-04
 * @Description  : 反向梯度扫描。静态图执行器与动态图记录带都把前向过程保存为
 *                 一串`OpRecord`，这里按逆序为每个变量累积梯度
 */

use std::collections::HashMap;

use super::{Kernel, Op, VarId};
use crate::errors::{HapiError, Result};
use crate::tensor::Tensor;

/// 一次算子调用的记录
#[derive(Debug, Clone)]
pub struct OpRecord {
    pub op: Op,
    pub inputs: Vec<VarId>,
    pub output: VarId,
    /// 前向时内核留下的中间量
    pub saved: Option<Tensor>,
}

/// 从`loss`出发反向传播，返回所有参与计算的变量的梯度（含中间变量）。
/// `values`按`VarId`下标存放前向结果。
pub fn backward(
    records: &[OpRecord],
    values: &[Option<Tensor>],
    loss: VarId,
) -> Result<HashMap<VarId, Tensor>> {
    let value_of = |id: VarId| {
        values
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| HapiError::NotReady(format!("反向传播时{id}没有前向值")))
    };

    let mut grads: HashMap<VarId, Tensor> = HashMap::new();
    grads.insert(loss, Tensor::full(value_of(loss)?.shape(), 1.));

    for record in records.iter().rev() {
        let Some(grad) = grads.get(&record.output).cloned() else {
            continue;
        };
        let inputs = record
            .inputs
            .iter()
            .map(|&id| value_of(id))
            .collect::<Result<Vec<_>>>()?;
        let output = value_of(record.output)?;
        let input_grads = record
            .op
            .backward(&inputs, output, &grad, record.saved.as_ref())?;
        for (&id, g) in record.inputs.iter().zip(input_grads) {
            let Some(g) = g else { continue };
            match grads.get_mut(&id) {
                Some(acc) => *acc += &g,
                None => {
                    grads.insert(id, g);
                }
            }
        }
    }
    Ok(grads)
}
