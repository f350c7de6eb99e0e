// ==========================================
// 共享单车再平衡调度系统 - 调度策略
// ==========================================
// 职责: 候选策略、评估结果与帕累托前沿集合
// 红线: 评估结果一经产出不可变更
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::RegulationDirection;

// ==========================================
// Strategy - 候选策略
// ==========================================

/// 单站点的参数化调度动作: 方向 + 按天重复模式 + 单次搬运量
///
/// 动作空间为离散化的按天位模式 (每天是否出车), 搬运量受卡车载量约束。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Strategy {
    pub direction: RegulationDirection, // 调度方向
    pub day_pattern: Vec<bool>,         // 各天是否执行干预
    pub quantity: u32,                  // 单次干预搬运车辆数
}

impl Strategy {
    pub fn new(direction: RegulationDirection, day_pattern: Vec<bool>, quantity: u32) -> Self {
        Self {
            direction,
            day_pattern,
            quantity,
        }
    }

    /// 基准策略 (不做任何干预), 下游比较的参照点
    pub fn baseline(n_days: usize) -> Self {
        Self {
            direction: RegulationDirection::Refill,
            day_pattern: vec![false; n_days],
            quantity: 0,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.quantity == 0 || self.day_pattern.iter().all(|b| !b)
    }

    /// 第 day 天的带符号干预量
    pub fn delta_on(&self, day: usize) -> i64 {
        if self.day_pattern.get(day).copied().unwrap_or(false) {
            self.direction.sign() * self.quantity as i64
        } else {
            0
        }
    }

    /// 出车次数
    pub fn visits(&self) -> usize {
        if self.quantity == 0 {
            return 0;
        }
        self.day_pattern.iter().filter(|&&b| b).count()
    }

    /// 总搬运车辆数
    pub fn bikes_moved(&self) -> u64 {
        self.visits() as u64 * self.quantity as u64
    }

    /// 位模式字符串, 例如 "[0010100]" (诊断导出用)
    pub fn pattern_string(&self) -> String {
        let bits: String = self
            .day_pattern
            .iter()
            .map(|&b| if b { '1' } else { '0' })
            .collect();
        format!("[{}]", bits)
    }
}

// ==========================================
// EvaluatedStrategy - 评估后的策略
// ==========================================

/// (站点, 策略) 对的仿真评估结果, 由潜在需求确定性推导
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedStrategy {
    pub station_id: String,     // 站点编码
    pub strategy_index: usize,  // 枚举序号 (同分并列时的平局规则)
    pub strategy: Strategy,     // 策略本体
    pub score: f64,             // 服务质量得分, [0, 1]
    pub cost: f64,              // 物流代价 (搬运量 + 出车成本)
    pub applyable: bool,        // 每次干预是否都在容忍范围内可落地
    pub min_ratio: f64,         // 战略检查点的最低占用率
    pub max_ratio: f64,         // 战略检查点的最高占用率
    pub unmet_demand: f64,      // 被容量截断的需求总量
}

// ==========================================
// ParetoSet - 帕累托前沿
// ==========================================

/// 单站点在 (cost, -score) 空间上的非支配策略子集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoSet {
    pub station_id: String,
    pub members: Vec<EvaluatedStrategy>,
    /// 基准策略已满足服务走廊, 无需出车 (原样保留基准作为唯一成员)
    pub autopass: bool,
}

impl ParetoSet {
    /// 是否存在需要卡车到场的候选策略
    pub fn needs_regulation(&self) -> bool {
        !self.autopass && self.members.iter().any(|m| !m.strategy.is_baseline())
    }
}
