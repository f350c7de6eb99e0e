// ==========================================
// 共享单车再平衡调度系统 - 配置层
// ==========================================
// 职责: 不可变配置结构的定义、加载与校验
// 红线: 各引擎在构造时接收配置, 任何阶段不得读取全局可变状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// ==========================================
// 配置错误
// ==========================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置校验失败: {0}")]
    Invalid(String),
}

// ==========================================
// CorridorConfig - 服务走廊
// ==========================================

/// 站点占用率应维持的 [下限, 上限] 区间 (容量占比)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorridorConfig {
    pub empty_ratio: f64, // 偏空判定阈值 (默认 0.22)
    pub full_ratio: f64,  // 偏满判定阈值 (默认 0.66)
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            empty_ratio: 0.22,
            full_ratio: 0.66,
        }
    }
}

// ==========================================
// FleetConfig - 车队参数
// ==========================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FleetConfig {
    pub fleet_size: usize,       // 卡车数量
    pub truck_capacity: u32,     // 单车道载量 (车辆数)
    pub truck_load: u32,         // 单次干预搬运量
    pub max_route_stops: usize,  // 单条路线最大停靠数
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            fleet_size: 5,
            truck_capacity: 15,
            truck_load: 15,
            max_route_stops: 10,
        }
    }
}

// ==========================================
// ReconstructionConfig - 需求重构参数
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub ranks: (usize, usize, usize), // Tucker 三模态秩 (站点, 天, 时间桶)
    pub max_iterations: usize,        // EM 迭代预算
    pub tolerance: f64,               // 收敛容差 (相对 Frobenius 变化)
    pub demand_clip: f64,             // 插补桶需求幅值截断 (观测桶不截断)
    pub censor_empty_margin: u32,     // 偏空删失余量 (库存 <= 余量 视为删失)
    pub censor_full_margin: u32,      // 偏满删失余量 (容量 - 库存 <= 余量 视为删失)
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            ranks: (8, 4, 12),
            max_iterations: 30,
            tolerance: 1e-3,
            demand_clip: 5.0,
            censor_empty_margin: 0,
            censor_full_margin: 0,
        }
    }
}

// ==========================================
// EvaluationConfig - 策略评估参数
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub check_hours: Vec<u32>, // 战略检查点 (小时)
    pub apply_tolerance: u32,  // 干预落地容忍量 (车辆数)
    pub visit_cost: f64,       // 单次出车的代价权重
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            check_hours: vec![8, 12, 18],
            apply_tolerance: 4,
            visit_cost: 1.0,
        }
    }
}

// ==========================================
// SolverConfig - 求解器参数
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub time_limit_secs: u64,   // 求解时限 (墙钟)
    pub gap_tolerance: f64,     // 可接受的最优性间隙
    pub n_truck_models: usize,  // 路由模型粒度档数 (外部求解器使用)
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 60,
            gap_tolerance: 0.01,
            n_truck_models: 3,
        }
    }
}

// ==========================================
// PlanningConfig - 全局规划参数
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    pub bins_per_day: usize,        // 时间桶粒度 (默认 72 = 20 分钟)
    pub max_stations_per_day: usize, // 单日可服务站点数上限
    pub same_type_penalty_km: f64,  // 同类型站点相邻停靠的距离惩罚
    pub topk_arcs: usize,           // 路由候选弧: k 近邻
    pub score_weight: f64,          // 目标函数: 得分权重
    pub effort_weight: f64,         // 目标函数: 出车代价权重
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            bins_per_day: 72,
            max_stations_per_day: 50,
            same_type_penalty_km: 5.0,
            topk_arcs: 10,
            score_weight: 20.0,
            effort_weight: 5.0,
        }
    }
}

// ==========================================
// PlannerConfig - 配置总装
// ==========================================

/// 全流程不可变配置, 在编排器构造时注入各引擎
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub corridor: CorridorConfig,
    pub fleet: FleetConfig,
    pub reconstruction: ReconstructionConfig,
    pub evaluation: EvaluationConfig,
    pub solver: SolverConfig,
    pub planning: PlanningConfig,
}

impl PlannerConfig {
    /// 从 JSON 文件加载并校验
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: PlannerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 配置一致性校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.corridor.empty_ratio < 0.0
            || self.corridor.full_ratio > 1.0
            || self.corridor.empty_ratio >= self.corridor.full_ratio
        {
            return Err(ConfigError::Invalid(format!(
                "服务走廊区间非法: [{}, {}]",
                self.corridor.empty_ratio, self.corridor.full_ratio
            )));
        }
        if self.fleet.fleet_size == 0 {
            return Err(ConfigError::Invalid("车队数量不能为 0".to_string()));
        }
        if self.fleet.truck_capacity == 0 {
            return Err(ConfigError::Invalid("卡车载量不能为 0".to_string()));
        }
        let (r1, r2, r3) = self.reconstruction.ranks;
        if r1 == 0 || r2 == 0 || r3 == 0 {
            return Err(ConfigError::Invalid("Tucker 秩不能为 0".to_string()));
        }
        if self.reconstruction.max_iterations == 0 {
            return Err(ConfigError::Invalid("迭代预算不能为 0".to_string()));
        }
        if self.planning.bins_per_day == 0 || self.planning.bins_per_day % 24 != 0 {
            return Err(ConfigError::Invalid(format!(
                "每日桶数必须为 24 的倍数: {}",
                self.planning.bins_per_day
            )));
        }
        if self.evaluation.check_hours.is_empty() {
            return Err(ConfigError::Invalid("战略检查点不能为空".to_string()));
        }
        if let Some(&h) = self.evaluation.check_hours.iter().find(|&&h| h >= 24) {
            return Err(ConfigError::Invalid(format!("检查点小时越界: {}", h)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PlannerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_corridor_rejected() {
        let mut config = PlannerConfig::default();
        config.corridor.empty_ratio = 0.8;
        config.corridor.full_ratio = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_fleet_rejected() {
        let mut config = PlannerConfig::default();
        config.fleet.fleet_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"fleet": {"fleet_size": 2, "truck_capacity": 10, "truck_load": 10, "max_route_stops": 8}}"#)
                .unwrap();
        assert_eq!(config.fleet.fleet_size, 2);
        assert_eq!(config.planning.bins_per_day, 72);
        assert!(config.validate().is_ok());
    }
}
