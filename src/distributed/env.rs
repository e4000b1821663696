use std::env;
use std::str::FromStr;

use crate::errors::{HapiError, Result};

/// 由启动器通过环境变量下发的并行配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelEnv {
    pub nranks: usize,
    pub local_rank: usize,
    /// 本进程使用的 GPU 编号
    pub dev_id: usize,
    pub trainer_endpoints: Vec<String>,
    pub current_endpoint: String,
}

impl Default for ParallelEnv {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

fn read_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            HapiError::InvalidArgument(format!("环境变量{key}的值`{raw}`无法解析"))
        }),
        _ => Ok(default),
    }
}

impl ParallelEnv {
    pub fn new(nranks: usize, local_rank: usize) -> Self {
        Self {
            nranks: nranks.max(1),
            local_rank,
            dev_id: 0,
            trainer_endpoints: Vec::new(),
            current_endpoint: String::new(),
        }
    }

    /// 读取`PADDLE_TRAINERS_NUM`、`PADDLE_TRAINER_ID`、`FLAGS_selected_gpus`、
    /// `PADDLE_TRAINER_ENDPOINTS`与`PADDLE_CURRENT_ENDPOINT`
    pub fn from_env() -> Result<Self> {
        let nranks: usize = read_var("PADDLE_TRAINERS_NUM", 1)?;
        let local_rank: usize = read_var("PADDLE_TRAINER_ID", 0)?;
        if local_rank >= nranks.max(1) {
            return Err(HapiError::InvalidArgument(format!(
                "PADDLE_TRAINER_ID={local_rank} 超出进程数 {nranks}"
            )));
        }
        let trainer_endpoints = env::var("PADDLE_TRAINER_ENDPOINTS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            nranks: nranks.max(1),
            local_rank,
            dev_id: read_var("FLAGS_selected_gpus", 0)?,
            trainer_endpoints,
            current_endpoint: env::var("PADDLE_CURRENT_ENDPOINT").unwrap_or_default(),
        })
    }

    pub const fn is_distributed(&self) -> bool {
        self.nranks > 1
    }
}
