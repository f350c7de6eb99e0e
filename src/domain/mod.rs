// ==========================================
// 共享单车再平衡调度系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务不变量
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod demand;
pub mod plan;
pub mod station;
pub mod strategy;
pub mod types;

// 重导出核心类型
pub use demand::{LatentDemand, ReconstructionDiagnostics};
pub use plan::{RegulationAction, RegulationPlan, SolveDiagnostics, TruckRoute, TruckStop};
pub use station::{Station, StockSeries, WeekGrid, DAYS_PER_WEEK};
pub use strategy::{EvaluatedStrategy, ParetoSet, Strategy};
pub use types::{InfeasibilityClass, RegulationDirection, SolveStatus};
