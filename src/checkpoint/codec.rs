/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 检查点产物的二进制格式
 *
 * 布局：magic(8) + version(4, 小端) + bincode 编码的`BTreeMap<String, StateEntry>`
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::{StateDict, StateValue};
use crate::errors::{HapiError, Result};
use crate::tensor::{DType, Tensor};

/// 检查点文件魔数
const STATE_MAGIC: &[u8; 8] = b"HAPISTAT";
/// 检查点文件版本
const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
enum StateEntry {
    Array {
        dtype: DType,
        shape: Vec<usize>,
        bytes: Vec<u8>,
    },
    Int(i64),
    Float(f64),
}

impl From<&StateValue> for StateEntry {
    fn from(value: &StateValue) -> Self {
        match value {
            StateValue::Tensor(t) => Self::Array {
                dtype: t.dtype(),
                shape: t.shape().to_vec(),
                bytes: t.to_le_bytes(),
            },
            StateValue::Int(v) => Self::Int(*v),
            StateValue::Float(v) => Self::Float(*v),
        }
    }
}

impl TryFrom<StateEntry> for StateValue {
    type Error = HapiError;

    fn try_from(entry: StateEntry) -> Result<Self> {
        Ok(match entry {
            StateEntry::Array {
                dtype,
                shape,
                bytes,
            } => Self::Tensor(Tensor::from_le_bytes(dtype, &shape, &bytes)?),
            StateEntry::Int(v) => Self::Int(v),
            StateEntry::Float(v) => Self::Float(v),
        })
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut os = prefix.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// 参数产物路径：`<prefix>.pdparams`
pub fn params_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".pdparams")
}

/// 优化器产物路径：`<prefix>.pdopt`
pub fn optimizer_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".pdopt")
}

pub fn save_state(path: &Path, state: &StateDict) -> Result<()> {
    let entries = state
        .iter()
        .map(|(k, v)| (k.clone(), StateEntry::from(v)))
        .collect::<BTreeMap<_, _>>();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(STATE_MAGIC)?;
    writer.write_all(&STATE_VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut writer, &entries)?;
    writer.flush()?;
    Ok(())
}

/// 读取检查点产物；文件不存在时返回`None`
pub fn load_state(path: &Path) -> Result<Option<StateDict>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != STATE_MAGIC {
        return Err(HapiError::Checkpoint(format!(
            "{}不是有效的检查点文件",
            path.display()
        )));
    }
    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != STATE_VERSION {
        return Err(HapiError::Checkpoint(format!(
            "不支持的检查点文件版本: {version}"
        )));
    }

    let entries: BTreeMap<String, StateEntry> = bincode::deserialize_from(reader)?;
    entries
        .into_iter()
        .map(|(k, e)| Ok((k, StateValue::try_from(e)?)))
        .collect::<Result<StateDict>>()
        .map(Some)
}
