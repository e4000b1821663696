/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 静态程序：变量表 + 有序的算子节点，以及喂入/取回所需的变量编号
 */

use std::collections::{BTreeMap, HashSet};

use crate::engine::{Op, VarId};

/// 变量的来源
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VarSource {
    /// 第 i 个喂入（输入在前、标签在后）
    Feed(usize),
    Param(String),
    /// 某个算子的输出
    Temp,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub op: Op,
    pub inputs: Vec<VarId>,
    pub output: VarId,
}

/// 放在程序最前面、只在训练时有意义的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prepended {
    /// 学习率衰减计数器自增
    IncrementCounter,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    pub vars: Vec<VarSource>,
    pub prepended: Vec<Prepended>,
    pub nodes: Vec<Node>,
    pub params: BTreeMap<String, VarId>,
    pub inputs: Vec<VarId>,
    pub labels: Vec<VarId>,
    pub outputs: Vec<VarId>,
    pub losses: Vec<VarId>,
    /// 每个指标一组状态变量
    pub metrics: Vec<Vec<VarId>>,
    /// 训练程序：求和后的总损失，执行时据此反向传播并调用优化器
    pub minimize: Option<VarId>,
    /// 推理模式（关闭 dropout 等训练期行为）
    pub is_test: bool,
}

impl Program {
    /// 基础程序；学习率带衰减时在最前面放一个计数器自增
    pub fn base(lr_scheduled: bool) -> Self {
        Self {
            prepended: if lr_scheduled {
                vec![Prepended::IncrementCounter]
            } else {
                Vec::new()
            },
            ..Self::default()
        }
    }

    pub fn new_var(&mut self, source: VarSource) -> VarId {
        self.vars.push(source);
        VarId(self.vars.len() - 1)
    }

    /// 去掉训练专用的前置操作（eval/test 程序）
    pub fn strip_prepended(&mut self) {
        self.prepended.clear();
    }

    /// 推理用的副本
    pub fn clone_for_test(&self) -> Self {
        Self {
            is_test: true,
            ..self.clone()
        }
    }

    /// 执行结束后需要读取的变量
    pub fn fetch_targets(&self) -> HashSet<VarId> {
        self.outputs
            .iter()
            .chain(&self.losses)
            .chain(self.metrics.iter().flatten())
            .chain(&self.minimize)
            .copied()
            .collect()
    }
}

/// 编译后的执行计划：每个节点执行完后可以释放的变量
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledPlan {
    pub frees: Vec<Vec<VarId>>,
}

impl CompiledPlan {
    /// 中间变量在最后一次被读取后释放；取回目标、参数与喂入始终保留
    pub fn compile(program: &Program) -> Self {
        let keep = program.fetch_targets();
        let mut last_use: BTreeMap<VarId, usize> = BTreeMap::new();
        for (i, node) in program.nodes.iter().enumerate() {
            for &id in &node.inputs {
                last_use.insert(id, i);
            }
        }
        let mut frees = vec![Vec::new(); program.nodes.len()];
        for (id, i) in last_use {
            let temp = matches!(program.vars.get(id.index()), Some(VarSource::Temp));
            if temp && !keep.contains(&id) {
                frees[i].push(id);
            }
        }
        Self { frees }
    }
}
