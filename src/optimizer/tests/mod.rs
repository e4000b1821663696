mod lr;
mod naming;

use crate::nn::{Init, ParameterStore};
use crate::tensor::Tensor;

/// 只含一个参数`w`（值为`value`）的参数存储
fn store_with(value: Tensor) -> ParameterStore {
    let mut store = ParameterStore::new(0);
    store.create("w", value.shape(), Init::Zeros).unwrap();
    store.set_value("w", value).unwrap();
    store
}
