/*
 * @Author       : 老董
 * @Date         : 2026-02-03
 * @Description  : 错误类型：张量层的 TensorError 与适配层的 HapiError
 */

use thiserror::Error;

/// 张量/算子层面的错误（形状、取值等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("数据长度{data_len}与形状{shape:?}不匹配")]
    DataShapeMismatch { data_len: usize, shape: Vec<usize> },

    #[error("形状不一致，故无法{operator}：第一个张量的形状为{lhs:?}，第二个张量的形状为{rhs:?}")]
    IncompatibleShapes {
        operator: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("{operator}需要{expected}维张量，但得到的形状为{got:?}")]
    RankMismatch {
        operator: &'static str,
        expected: usize,
        got: Vec<usize>,
    },

    #[error("张量列表为空")]
    EmptyList,

    #[error("批次截断长度{keep}超出批大小{batch}")]
    SliceOutOfRange { keep: usize, batch: usize },

    #[error("算子`{op}`需要{expected}个输入，但得到{got}个")]
    ArityMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },
}

/// 适配层统一错误类型
#[derive(Error, Debug)]
pub enum HapiError {
    /// 前置条件未满足（未 prepare、未设置优化器/设备、程序未构建等）
    #[error("模型未就绪：{0}")]
    NotReady(String),

    /// 配置非法（设备、输入类型、损失函数等）
    #[error("参数非法：{0}")]
    InvalidArgument(String),

    /// 检查点中的参数缺失或形状不符
    #[error("{}", describe_param_mismatch(.key, .expected, .received))]
    ParameterMismatch {
        key: String,
        expected: Vec<usize>,
        received: Option<Vec<usize>>,
    },

    /// 转换后仍缺失优化器所需的累积量
    #[error("变量[{key}]不在优化器状态文件中")]
    OptimizerStateMismatch { key: String },

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Data(#[from] crate::data::DataError),

    #[error("检查点错误：{0}")]
    Checkpoint(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("二进制编解码失败: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_param_mismatch(key: &str, expected: &[usize], received: &Option<Vec<usize>>) -> String {
    match received {
        None => format!("{key} 不在所提供的参数文件中"),
        Some(received) => {
            format!("{key} 得到的形状为{received:?}，但期望的形状为{expected:?}")
        }
    }
}

pub type Result<T> = std::result::Result<T, HapiError>;
