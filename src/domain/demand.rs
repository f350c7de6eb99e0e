// ==========================================
// 共享单车再平衡调度系统 - 潜在需求张量
// ==========================================
// 职责: 重构后的 (站点 × 天 × 时间桶) 净流量张量及其诊断信息
// 不变量: 非删失桶上的需求等于观测净流量 (一致性定律)
// ==========================================

use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::station::WeekGrid;

// ==========================================
// ReconstructionDiagnostics - 重构诊断
// ==========================================

/// 需求重构的收敛诊断 (非致命信息, 供调用方评估置信度)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionDiagnostics {
    pub iterations: usize,                  // 实际迭代次数
    pub residual: f64,                      // 末次迭代的相对变化量
    pub converged: bool,                    // 是否在迭代预算内收敛
    pub censored_cells: usize,              // 删失桶总数
    pub low_confidence_stations: Vec<String>, // 整周无内点观测的站点 (仅全局低秩预测)
}

// ==========================================
// LatentDemand - 潜在需求
// ==========================================

/// 一个参考周的潜在净需求 (正 = 净到达, 负 = 净离开), 假定按周重复
#[derive(Debug, Clone)]
pub struct LatentDemand {
    pub grid: WeekGrid,
    pub station_ids: Vec<String>,
    /// 需求张量, 形状 (站点数, 7, 每日桶数)
    pub demand: Array3<f64>,
    pub diagnostics: ReconstructionDiagnostics,
}

impl LatentDemand {
    /// 单站点的 (天 × 桶) 需求视图
    pub fn station_demand(&self, station_index: usize) -> ArrayView2<'_, f64> {
        self.demand.index_axis(Axis(0), station_index)
    }

    /// 站点编码 → 张量下标
    pub fn station_index(&self, station_id: &str) -> Option<usize> {
        self.station_ids.iter().position(|s| s == station_id)
    }

    pub fn n_stations(&self) -> usize {
        self.station_ids.len()
    }

    /// 导出重构需求 CSV (诊断产物, 每行一个 (站点, 天, 桶))
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["station", "day", "bin", "demand"])?;
        for (s, station_id) in self.station_ids.iter().enumerate() {
            for ((day, bin), &value) in self.station_demand(s).indexed_iter() {
                writer.write_record([
                    station_id.clone(),
                    day.to_string(),
                    bin.to_string(),
                    format!("{:.4}", value),
                ])?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
