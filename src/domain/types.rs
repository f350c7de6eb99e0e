// ==========================================
// 共享单车再平衡调度系统 - 领域类型定义
// ==========================================
// 职责: 定义全局枚举类型
// 红线: 纯类型定义,不含业务逻辑
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// RegulationDirection - 调度方向
// ==========================================

/// 调度方向: 向站点投放车辆(补车)或从站点回收车辆(收车)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationDirection {
    /// 补车: 卡车向站点投放车辆 (站点偏空)
    Refill,
    /// 收车: 卡车从站点回收车辆 (站点偏满)
    Removal,
}

impl RegulationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegulationDirection::Refill => "refill",
            RegulationDirection::Removal => "removal",
        }
    }

    /// 方向符号: 补车为 +1, 收车为 -1
    pub fn sign(&self) -> i64 {
        match self {
            RegulationDirection::Refill => 1,
            RegulationDirection::Removal => -1,
        }
    }
}

impl std::str::FromStr for RegulationDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "refill" => Ok(RegulationDirection::Refill),
            "removal" => Ok(RegulationDirection::Removal),
            other => Err(format!("未知调度方向: {}", other)),
        }
    }
}

// ==========================================
// SolveStatus - 求解状态
// ==========================================

/// 优化求解状态 (外部求解器返回)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// 已证明最优
    Optimal,
    /// 时限内找到可行解 (未证明最优)
    Feasible,
    /// 不可行
    Infeasible,
    /// 无界
    Unbounded,
    /// 时限耗尽且无任何可行解
    NoIncumbent,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::NoIncumbent => "no_incumbent",
        }
    }

    /// 是否携带可用解
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

// ==========================================
// InfeasibilityClass - 不可行原因分类
// ==========================================

/// 不可行约束类别 (用于致命错误的归因)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibilityClass {
    /// 车队载量不足
    FleetCapacity,
    /// 访问时间窗冲突
    TimeWindow,
    /// 单日可服务站点数超限
    StationCount,
}

impl InfeasibilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfeasibilityClass::FleetCapacity => "fleet_capacity",
            InfeasibilityClass::TimeWindow => "time_window",
            InfeasibilityClass::StationCount => "station_count",
        }
    }
}
