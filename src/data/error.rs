//! 数据加载错误类型定义

use thiserror::Error;

/// 数据集与加载器相关错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// 索引越界
    #[error("索引越界: {index} >= {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// 各字段的样本数不一致
    #[error("第{field}个字段的样本数为{got}，但第0个字段为{expected}")]
    LengthMismatch {
        field: usize,
        expected: usize,
        got: usize,
    },

    /// 数据集至少需要一个字段
    #[error("数据集没有任何字段")]
    NoField,

    /// 批次的字段数少于声明的输入个数
    #[error("批次只有{got}个字段，无法切出{inputs}个输入")]
    NotEnoughFields { inputs: usize, got: usize },
}
