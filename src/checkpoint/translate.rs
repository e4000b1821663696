/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 优化器累积量在两种执行模式命名之间的转换
 *
 * 同一个（参数, 累积量种类）在两种模式下的变量名不同：
 * - 静态图：`{参数名}_{[优化器名_]}{种类}_{序号}`，可以直接拼出来；
 * - 动态图：`{参数名}_{优化器唯一名}_{种类}_0`，其中唯一名形如`{优化器名或类名}_{k}`，
 *   k 由进程级计数器决定，只能从已有的键里“猜”出来。
 *
 * 猜测规则：把候选键按长度从长到短排序（避免短前缀抢先命中），找第一个以
 * `{参数名}_{优化器名或类名}_`开头的键，取出该前缀之后到下一个下划线之间的片段，
 * 与优化器名或类名拼成唯一名。只在第一次遇到无法直接解析的键时猜一次，之后所有
 * 参数都沿用这个唯一名。这是启发式的：多个优化器或参数名互为前缀时可能猜错。
 */

use super::{DYNAMIC_COUNTER, STATIC_COUNTER, StateDict, StateValue};
use crate::errors::{HapiError, Result};

/// 优化器所需变量的用途
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarRole {
    /// 学习率衰减计数器
    Counter,
    /// 静态图下固定学习率对应的变量
    LearningRate,
    Accumulator { param: String, kind: String },
}

/// 静态图优化器需要从检查点恢复的一个变量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredVar {
    pub name: String,
    pub role: VarRole,
}

#[derive(Debug, Clone)]
pub struct CheckpointTranslator {
    class_name: String,
    name: Option<String>,
    unique_name: String,
}

impl CheckpointTranslator {
    pub fn new(class_name: &str, name: Option<&str>, unique_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            name: name.map(str::to_string),
            unique_name: unique_name.to_string(),
        }
    }

    /// 静态图计数器 -> 动态图`global_step`（动态图的计数总比静态图大1）
    pub const fn counter_to_dynamic(counter: i64) -> i64 {
        counter + 1
    }

    pub const fn counter_to_static(global_step: i64) -> i64 {
        global_step - 1
    }

    /// 优化器名，未命名时用类名
    fn base_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class_name)
    }

    /// 按长度降序排列的键（等长时保持字典序）
    fn keys_longest_first(state: &StateDict) -> Vec<&str> {
        let mut keys = state.keys().map(String::as_str).collect::<Vec<_>>();
        keys.sort_by(|a, b| b.len().cmp(&a.len()));
        keys
    }

    /// 从`state`中猜出`param`对应的动态图唯一名；`numeric_only`时要求序号全为数字。
    /// 有多个键同时匹配时取最长的那个，而不是最后遍历到的最短键
    fn recover_unique(&self, state: &StateDict, param: &str, numeric_only: bool) -> Option<String> {
        let prefix = format!("{param}_{}_", self.base_name());
        Self::keys_longest_first(state).into_iter().find_map(|key| {
            let rest = key.strip_prefix(&prefix)?;
            let tail = &rest[..rest.find('_')?];
            if numeric_only && (tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit())) {
                return None;
            }
            Some(format!("{}_{tail}", self.base_name()))
        })
    }

    /// 把（可能来自动态图的）优化器状态转换为静态图下`required`列出的变量。
    /// 固定学习率变量缺失时跳过；其余变量缺失则报错
    pub fn to_static(&self, state: &StateDict, required: &[RequiredVar]) -> Result<StateDict> {
        let mut source = state.clone();
        let mut converted = StateDict::new();
        let mut unique: Option<String> = None;

        for var in required {
            match &var.role {
                VarRole::Counter => {
                    let value = match source.remove(DYNAMIC_COUNTER) {
                        Some(step) => Some(StateValue::Int(Self::counter_to_static(
                            step.as_int().ok_or_else(|| HapiError::Checkpoint(format!(
                                "{DYNAMIC_COUNTER} 不是整数"
                            )))?,
                        ))),
                        None => source.remove(STATIC_COUNTER),
                    };
                    if let Some(value) = value {
                        converted.insert(var.name.clone(), value);
                    }
                }
                VarRole::LearningRate => {
                    // 动态图不保存固定学习率
                    match source.remove(&var.name) {
                        Some(value) => {
                            converted.insert(var.name.clone(), value);
                        }
                        None => continue,
                    }
                }
                VarRole::Accumulator { param, kind } => {
                    if let Some(value) = source.remove(&var.name) {
                        converted.insert(var.name.clone(), value);
                    } else {
                        if unique.is_none() {
                            unique = self.recover_unique(state, param, false);
                        }
                        if let Some(unique) = &unique {
                            let dy_name = format!("{param}_{unique}_{kind}_0");
                            if let Some(value) = source.remove(&dy_name) {
                                converted.insert(var.name.clone(), value);
                            }
                        }
                    }
                }
            }
            if !converted.contains_key(&var.name) {
                return Err(HapiError::OptimizerStateMismatch {
                    key: var.name.clone(),
                });
            }
        }
        Ok(converted)
    }

    /// 把（可能来自静态图或另一个唯一名的）优化器状态扩充出动态图命名的键，
    /// 原有的键保持不变
    pub fn to_dynamic(&self, state: &StateDict, param_names: &[String]) -> StateDict {
        let mut converted = state.clone();
        self.renumber(state, &mut converted, param_names);
        let unique = &self.unique_name;
        // 去掉唯一名末尾的序号
        let opt_name = unique.rfind('_').map_or(unique.as_str(), |i| &unique[..i]);

        for key in Self::keys_longest_first(state) {
            let Some(value) = state.get(key) else { continue };
            if key == STATIC_COUNTER {
                if let Some(counter) = value.as_int() {
                    converted.remove(STATIC_COUNTER);
                    converted.insert(
                        DYNAMIC_COUNTER.to_string(),
                        StateValue::Int(Self::counter_to_dynamic(counter)),
                    );
                }
                continue;
            }
            if key == DYNAMIC_COUNTER {
                continue;
            }
            for param in param_names {
                let accum = if key.starts_with(&format!("{param}_{opt_name}")) {
                    // 优化器带名字
                    key.get(param.len() + opt_name.len() + 2..)
                } else if opt_name == self.class_name {
                    // 优化器未命名
                    key.strip_prefix(&format!("{param}_"))
                } else {
                    None
                };
                let Some(accum) = accum else { continue };
                // 去掉末尾的序号
                let Some(end) = accum.rfind('_') else { continue };
                let dy_name = format!("{param}_{unique}_{}_0", &accum[..end]);
                converted.insert(dy_name, value.clone());
            }
        }
        converted
    }

    /// 动态图检查点来自另一个唯一名（如`Momentum_3`）时，改用当前唯一名重新登记
    fn renumber(&self, state: &StateDict, converted: &mut StateDict, param_names: &[String]) {
        let Some(old) = param_names
            .iter()
            .find_map(|p| self.recover_unique(state, p, true))
        else {
            return;
        };
        if old == self.unique_name {
            return;
        }
        let renamed = state
            .iter()
            .filter_map(|(key, value)| {
                param_names.iter().find_map(|param| {
                    let rest = key.strip_prefix(&format!("{param}_{old}_"))?;
                    Some((format!("{param}_{}_{rest}", self.unique_name), value.clone()))
                })
            })
            .collect::<Vec<_>>();
        for (key, value) in renamed {
            converted.entry(key).or_insert(value);
        }
    }
}
