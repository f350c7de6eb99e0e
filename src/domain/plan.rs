// ==========================================
// 共享单车再平衡调度系统 - 调度计划
// ==========================================
// 职责: 最终对外交付的 (天, 站点, 卡车, 动作) 计划与求解诊断
// 红线: 计划一经产出不可变更, 重跑生成新计划
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::domain::types::{InfeasibilityClass, SolveStatus};

// ==========================================
// RegulationAction - 单次调度动作
// ==========================================

/// 现场可执行的单条调度记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationAction {
    pub day: usize,            // 周内第几天 (0 = 周一)
    pub station_id: String,    // 站点编码
    pub truck_id: usize,       // 执行卡车编号
    pub delta_bikes: i64,      // 车辆变动 (正 = 投放, 负 = 回收)
}

// ==========================================
// TruckRoute - 卡车路线
// ==========================================

/// 路线停靠点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckStop {
    pub seq: usize,            // 停靠顺序 (1 起)
    pub station_id: String,
    pub delta_bikes: i64,
}

/// 单卡车单日路线 (顺序停靠, 累计载量不超过卡车容量)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckRoute {
    pub day: usize,
    pub truck_id: usize,
    pub stops: Vec<TruckStop>,
    pub distance_km: f64,
}

// ==========================================
// SolveDiagnostics - 求解诊断
// ==========================================

/// 优化求解统计 (目标值、gap、耗时、降级标记)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveDiagnostics {
    pub status: SolveStatus,
    pub objective: f64,
    pub gap: f64,                               // 证明或启发式的最优性间隙
    pub elapsed_ms: i64,
    pub relaxed: bool,                          // 是否启用了放松模型 (丢弃车队耦合)
    pub routing_honored: bool,                  // 路由层是否被满足
    pub infeasibility: Option<InfeasibilityClass>, // 触发放松的约束类别
}

// ==========================================
// RegulationPlan - 调度计划
// ==========================================

/// 一次规划周期的最终产物
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationPlan {
    pub plan_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub actions: Vec<RegulationAction>,
    pub routes: Vec<TruckRoute>,
    pub diagnostics: SolveDiagnostics,
}

impl RegulationPlan {
    pub fn new(
        actions: Vec<RegulationAction>,
        routes: Vec<TruckRoute>,
        diagnostics: SolveDiagnostics,
    ) -> Self {
        Self {
            plan_id: Uuid::new_v4(),
            created_at: Utc::now(),
            actions,
            routes,
            diagnostics,
        }
    }

    /// 空计划 (全网自达标或无站点可调)
    pub fn empty(diagnostics: SolveDiagnostics) -> Self {
        Self::new(Vec::new(), Vec::new(), diagnostics)
    }

    /// 导出现场执行清单 CSV (day, station, truck, delta_bikes)
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["day", "station", "truck", "delta_bikes"])?;
        for action in &self.actions {
            writer.write_record([
                action.day.to_string(),
                action.station_id.clone(),
                action.truck_id.to_string(),
                action.delta_bikes.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_diagnostics() -> SolveDiagnostics {
        SolveDiagnostics {
            status: SolveStatus::Optimal,
            objective: 12.5,
            gap: 0.0,
            elapsed_ms: 3,
            relaxed: false,
            routing_honored: true,
            infeasibility: None,
        }
    }

    #[test]
    fn test_empty_plan() {
        let plan = RegulationPlan::empty(test_diagnostics());
        assert!(plan.actions.is_empty());
        assert!(plan.routes.is_empty());
        assert_eq!(plan.diagnostics.status, SolveStatus::Optimal);
    }
}
