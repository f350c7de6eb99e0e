// ==========================================
// 共享单车再平衡调度系统 - 混合整数求解接口
// ==========================================
// 职责: 变量/约束/目标模型的构建接口与不透明求解器抽象
// 说明: 求解引擎本身是外部协作方 (solve(model, 时限, gap) → 解/状态);
//       内置 BranchBoundSolver 是用于测试与小规模实例的弱替代实现
// ==========================================

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::domain::types::SolveStatus;

// ==========================================
// 模型结构
// ==========================================

pub type VarId = usize;

/// 决策变量类别
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarKind {
    Binary,
    Integer { lb: i64, ub: i64 },
    Continuous { lb: f64, ub: f64 },
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// 目标函数系数 (最大化)
    pub objective: f64,
}

/// 线性约束比较方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub op: CmpOp,
    pub rhs: f64,
}

/// 线性最大化混合整数模型
#[derive(Debug, Clone)]
pub struct MipModel {
    pub name: String,
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
}

impl MipModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            variables: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn add_binary(&mut self, name: String, objective: f64) -> VarId {
        self.add_variable(name, VarKind::Binary, objective)
    }

    pub fn add_integer(&mut self, name: String, lb: i64, ub: i64, objective: f64) -> VarId {
        self.add_variable(name, VarKind::Integer { lb, ub }, objective)
    }

    pub fn add_continuous(&mut self, name: String, lb: f64, ub: f64, objective: f64) -> VarId {
        self.add_variable(name, VarKind::Continuous { lb, ub }, objective)
    }

    fn add_variable(&mut self, name: String, kind: VarKind, objective: f64) -> VarId {
        let id = self.variables.len();
        self.variables.push(Variable {
            name,
            kind,
            objective,
        });
        id
    }

    pub fn add_constraint(&mut self, name: String, terms: Vec<(VarId, f64)>, op: CmpOp, rhs: f64) {
        self.constraints.push(Constraint {
            name,
            terms,
            op,
            rhs,
        });
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }
}

// ==========================================
// 求解结果
// ==========================================

#[derive(Debug, Clone, Copy)]
pub struct SolveLimits {
    pub time_limit: Duration,
    pub gap_tolerance: f64,
}

impl SolveLimits {
    pub fn new(time_limit: Duration, gap_tolerance: f64) -> Self {
        Self {
            time_limit,
            gap_tolerance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MipSolution {
    pub status: SolveStatus,
    pub objective: f64,
    /// 证明或启发式的最优性间隙 (最优解为 0)
    pub gap: f64,
    pub values: Vec<f64>,
}

impl MipSolution {
    pub fn value(&self, id: VarId) -> f64 {
        self.values.get(id).copied().unwrap_or(0.0)
    }

    pub fn is_one(&self, id: VarId) -> bool {
        self.value(id) > 0.5
    }
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("求解器不支持该模型: {0}")]
    Unsupported(String),
}

/// 不透明求解器抽象: 任何混合整数求解引擎都可在此接入
pub trait MipSolver: Send + Sync {
    fn solve(&self, model: &MipModel, limits: &SolveLimits) -> Result<MipSolution, SolverError>;
}

// ==========================================
// BranchBoundSolver - 内置弱求解器
// ==========================================

/// 确定性深度优先分支定界 (仅支持二元/有界整数变量)
///
/// 剪枝: 约束区间传播 + 乐观目标上界; 支持墙钟时限与 gap 提前终止。
pub struct BranchBoundSolver;

struct SearchState<'a> {
    model: &'a MipModel,
    /// 变量处理顺序 (|目标系数| 降序, 同系数按编号)
    order: Vec<VarId>,
    values: Vec<i64>,
    assigned: Vec<bool>,
    incumbent: Option<(f64, Vec<i64>)>,
    root_bound: f64,
    deadline: Instant,
    gap_tolerance: f64,
    timed_out: bool,
}

impl BranchBoundSolver {
    fn domain(kind: VarKind) -> (i64, i64) {
        match kind {
            VarKind::Binary => (0, 1),
            VarKind::Integer { lb, ub } => (lb, ub),
            VarKind::Continuous { .. } => (0, 0),
        }
    }

    /// 变量在目标中的最优贡献 (最大化)
    fn best_contribution(var: &Variable) -> f64 {
        let (lb, ub) = Self::domain(var.kind);
        (var.objective * lb as f64).max(var.objective * ub as f64)
    }

    /// 给定部分赋值, 每条约束的可达区间剪枝
    fn constraints_satisfiable(state: &SearchState) -> bool {
        for constraint in &state.model.constraints {
            let mut lo = 0.0;
            let mut hi = 0.0;
            for &(id, coefficient) in &constraint.terms {
                if state.assigned[id] {
                    let v = coefficient * state.values[id] as f64;
                    lo += v;
                    hi += v;
                } else {
                    let (dlb, dub) = Self::domain(state.model.variables[id].kind);
                    let a = coefficient * dlb as f64;
                    let b = coefficient * dub as f64;
                    lo += a.min(b);
                    hi += a.max(b);
                }
            }
            let feasible = match constraint.op {
                CmpOp::Le => lo <= constraint.rhs + 1e-9,
                CmpOp::Ge => hi >= constraint.rhs - 1e-9,
                CmpOp::Eq => lo <= constraint.rhs + 1e-9 && hi >= constraint.rhs - 1e-9,
            };
            if !feasible {
                return false;
            }
        }
        true
    }

    fn dfs(state: &mut SearchState, depth: usize, objective: f64) {
        if Instant::now() > state.deadline {
            state.timed_out = true;
            return;
        }

        // gap 提前终止: 现任解已足够接近全局乐观上界
        if let Some((incumbent, _)) = &state.incumbent {
            let gap = (state.root_bound - incumbent) / incumbent.abs().max(1e-9);
            if gap <= state.gap_tolerance {
                return;
            }
        }

        if depth == state.order.len() {
            let improved = match &state.incumbent {
                Some((best, _)) => objective > best + 1e-9,
                None => true,
            };
            if improved {
                state.incumbent = Some((objective, state.values.clone()));
            }
            return;
        }

        // 乐观上界剪枝
        let mut bound = objective;
        for &id in &state.order[depth..] {
            bound += Self::best_contribution(&state.model.variables[id]);
        }
        if let Some((incumbent, _)) = &state.incumbent {
            if bound <= incumbent + 1e-9 {
                return;
            }
        }

        let id = state.order[depth];
        let var = &state.model.variables[id];
        let (lb, ub) = Self::domain(var.kind);

        // 取值顺序: 目标贡献大者优先; 零系数从小到大 (流量变量先试 0)
        let mut candidates: Vec<i64> = (lb..=ub).collect();
        if var.objective > 0.0 {
            candidates.reverse();
        }

        for value in candidates {
            state.values[id] = value;
            state.assigned[id] = true;
            if Self::constraints_satisfiable(state) {
                Self::dfs(state, depth + 1, objective + var.objective * value as f64);
            }
            state.assigned[id] = false;
            if state.timed_out {
                return;
            }
        }
    }
}

impl MipSolver for BranchBoundSolver {
    fn solve(&self, model: &MipModel, limits: &SolveLimits) -> Result<MipSolution, SolverError> {
        for variable in &model.variables {
            if matches!(variable.kind, VarKind::Continuous { .. }) {
                return Err(SolverError::Unsupported(format!(
                    "内置求解器不支持连续变量: {}",
                    variable.name
                )));
            }
        }

        let mut order: Vec<VarId> = (0..model.n_variables()).collect();
        order.sort_by(|&a, &b| {
            model.variables[b]
                .objective
                .abs()
                .partial_cmp(&model.variables[a].objective.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let root_bound: f64 = model.variables.iter().map(Self::best_contribution).sum();

        let mut state = SearchState {
            model,
            order,
            values: vec![0; model.n_variables()],
            assigned: vec![false; model.n_variables()],
            incumbent: None,
            root_bound,
            deadline: Instant::now() + limits.time_limit,
            gap_tolerance: limits.gap_tolerance,
            timed_out: false,
        };

        Self::dfs(&mut state, 0, 0.0);

        match state.incumbent {
            Some((objective, values)) => {
                let gap = if state.timed_out {
                    ((state.root_bound - objective) / objective.abs().max(1e-9)).max(0.0)
                } else {
                    0.0
                };
                let status = if state.timed_out {
                    SolveStatus::Feasible
                } else {
                    SolveStatus::Optimal
                };
                Ok(MipSolution {
                    status,
                    objective,
                    gap,
                    values: values.into_iter().map(|v| v as f64).collect(),
                })
            }
            None => {
                let status = if state.timed_out {
                    SolveStatus::NoIncumbent
                } else {
                    SolveStatus::Infeasible
                };
                Ok(MipSolution {
                    status,
                    objective: f64::NEG_INFINITY,
                    gap: f64::INFINITY,
                    values: vec![0.0; model.n_variables()],
                })
            }
        }
    }
}
