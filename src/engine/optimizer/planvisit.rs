// ==========================================
// 共享单车再平衡调度系统 - 访问计划模型 (策略选择层)
// ==========================================
// 职责: 多选一背包式的站点策略选择 MILP 建模
// 约束: 每站至多一个策略; 单日服务站点数上限;
//       单日单方向搬运总量不超过车队载量 (车队耦合层)
// ==========================================

use crate::config::PlannerConfig;
use crate::domain::station::DAYS_PER_WEEK;
use crate::domain::strategy::ParetoSet;
use crate::engine::optimizer::solver::{CmpOp, MipModel, MipSolution, VarId};

// ==========================================
// 模型结构
// ==========================================

/// 一个候选选择变量: (站点下标, 前沿成员下标) → 二元变量
#[derive(Debug, Clone)]
pub struct VisitCandidate {
    pub set_index: usize,
    pub member_index: usize,
    pub var: VarId,
}

/// 构建完成的访问计划模型
pub struct VisitModel {
    pub model: MipModel,
    pub candidates: Vec<VisitCandidate>,
}

impl VisitModel {
    /// 从求解结果解码被选中的 (站点, 策略) 对
    pub fn decode(&self, solution: &MipSolution) -> Vec<(usize, usize)> {
        self.candidates
            .iter()
            .filter(|c| solution.is_one(c.var))
            .map(|c| (c.set_index, c.member_index))
            .collect()
    }
}

// ==========================================
// VisitModelBuilder - 建模器
// ==========================================

pub struct VisitModelBuilder<'a> {
    config: &'a PlannerConfig,
}

impl<'a> VisitModelBuilder<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// 构建策略选择模型
    ///
    /// # 参数
    /// - sets: 需要出车的站点前沿 (不含 autopass)
    /// - relaxed: 放松模式, 丢弃车队耦合约束 (仅保留每站至多一个)
    pub fn build(&self, sets: &[&ParetoSet], relaxed: bool) -> VisitModel {
        let mut model = MipModel::new(if relaxed {
            "visit_plan_relaxed"
        } else {
            "visit_plan"
        });
        let mut candidates = Vec::new();

        let n_sets = sets.len();
        // 对称性破除权重 (站点与天各自从 1 微升到 1.1)
        let station_weight = |s: usize| -> f64 {
            if n_sets <= 1 {
                1.0
            } else {
                1.0 + 0.1 * s as f64 / (n_sets - 1) as f64
            }
        };
        let day_weight = |d: usize| -> f64 {
            1.0 + 0.1 * d as f64 / (DAYS_PER_WEEK - 1) as f64
        };

        // 变量: 每个非基准前沿成员一个二元选择变量
        for (set_index, set) in sets.iter().enumerate() {
            let sw = station_weight(set_index);
            for (member_index, member) in set.members.iter().enumerate() {
                if member.strategy.is_baseline() {
                    continue;
                }
                // 目标: 得分收益 - 出车代价 (晚出车代价略高 → 倾向早干预)
                let effort: f64 = (0..DAYS_PER_WEEK)
                    .filter(|&d| member.strategy.delta_on(d) != 0)
                    .map(day_weight)
                    .sum();
                let objective = self.config.planning.score_weight * member.score * sw
                    - self.config.planning.effort_weight * sw * effort;
                let var = model.add_binary(
                    format!("y_{}_{}", set.station_id, member_index),
                    objective,
                );
                candidates.push(VisitCandidate {
                    set_index,
                    member_index,
                    var,
                });
            }
        }

        // 每站至多选择一个策略
        for (set_index, set) in sets.iter().enumerate() {
            let terms: Vec<(VarId, f64)> = candidates
                .iter()
                .filter(|c| c.set_index == set_index)
                .map(|c| (c.var, 1.0))
                .collect();
            if !terms.is_empty() {
                model.add_constraint(
                    format!("one_strategy_{}", set.station_id),
                    terms,
                    CmpOp::Le,
                    1.0,
                );
            }
        }

        if !relaxed {
            let fleet_load =
                (self.config.fleet.fleet_size as f64) * (self.config.fleet.truck_capacity as f64);

            for day in 0..DAYS_PER_WEEK {
                // 单日服务站点数上限
                let visit_terms: Vec<(VarId, f64)> = candidates
                    .iter()
                    .filter(|c| {
                        sets[c.set_index].members[c.member_index]
                            .strategy
                            .delta_on(day)
                            != 0
                    })
                    .map(|c| (c.var, 1.0))
                    .collect();
                if !visit_terms.is_empty() {
                    model.add_constraint(
                        format!("day_limit_{}", day),
                        visit_terms,
                        CmpOp::Le,
                        self.config.planning.max_stations_per_day as f64,
                    );
                }

                // 单日单方向搬运总量不超过车队载量
                for sign in [1i64, -1i64] {
                    let load_terms: Vec<(VarId, f64)> = candidates
                        .iter()
                        .filter_map(|c| {
                            let delta =
                                sets[c.set_index].members[c.member_index].strategy.delta_on(day);
                            if delta.signum() == sign {
                                Some((c.var, delta.unsigned_abs() as f64))
                            } else {
                                None
                            }
                        })
                        .collect();
                    if !load_terms.is_empty() {
                        let direction = if sign > 0 { "refill" } else { "removal" };
                        model.add_constraint(
                            format!("fleet_load_{}_{}", direction, day),
                            load_terms,
                            CmpOp::Le,
                            fleet_load,
                        );
                    }
                }
            }
        }

        VisitModel { model, candidates }
    }
}
