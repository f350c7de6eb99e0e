// ==========================================
// 共享单车再平衡调度系统 - 核心库
// ==========================================
// 技术栈: Rust + ndarray/nalgebra + 混合整数求解
// 系统定位: 周度批处理决策支持系统 (人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 存储层 - 时间序列观测
pub mod store;

// 引擎层 - 规划算法
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{InfeasibilityClass, RegulationDirection, SolveStatus};

// 领域实体
pub use domain::{
    EvaluatedStrategy, LatentDemand, ParetoSet, RegulationAction, RegulationPlan,
    SolveDiagnostics, Station, StockSeries, Strategy, TruckRoute, WeekGrid,
};

// 引擎
pub use engine::{
    BranchBoundSolver, DemandReconstructor, FrontierExtractor, MipSolver, PlanOptimizer,
    PlanningError, PlanningOrchestrator, PlanningResult, StrategyEvaluator,
};

// 存储
pub use store::{InMemoryTimeSeriesStore, TimeSeriesStore};

// 配置
pub use config::PlannerConfig;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "共享单车再平衡调度系统";

// ==========================================
// 预编译检查
// ==========================================
