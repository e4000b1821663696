/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 网络构建相关：参数及其存储、初始化方式、输入声明、网络/层、损失函数与评估指标
 */

mod init;
mod input;
mod layer;
mod loss;
mod metric;
mod parameter;

pub use init::Init;
pub use input::{Input, InputSpec};
pub use layer::{Activation, Linear, Mlp};
pub use loss::{CrossEntropy, Loss, MeanSquaredError};
pub use metric::{Accuracy, Metric};
pub use parameter::{Gradients, Parameter, ParameterStore};

use crate::engine::{Emitter, VarId};
use crate::errors::Result;


/// 用户网络。
///
/// 参数在构造模型时通过`create_parameters`一次性登记到`ParameterStore`；
/// `forward`只通过`Emitter`发出算子，因此同一份网络定义既能构建静态程序，
/// 也能在动态图下即时执行。
pub trait Network {
    fn create_parameters(&self, store: &mut ParameterStore) -> Result<()>;

    fn forward(&self, emitter: &mut dyn Emitter, inputs: &[VarId]) -> Result<Vec<VarId>>;

    /// `forward`各个输入的名字，用于把按名字给出的`Input`排成位置顺序
    fn input_names(&self) -> Vec<String> {
        Vec::new()
    }
}
