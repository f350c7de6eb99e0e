// ==========================================
// 共享单车再平衡调度系统 - 引擎层
// ==========================================
// 职责: 实现规划算法核心, 不做数据清洗与入库
// 红线: 各阶段对存储层只读, 产物一经产出不可变更
// ==========================================

pub mod demand;
pub mod error;
pub mod evaluation;
pub mod frontier;
pub mod optimizer;
pub mod orchestrator;

// 重导出核心引擎
pub use demand::{reconstruct_tensor, DemandReconstructor};
pub use error::PlanningError;
pub use evaluation::{
    write_evaluation_csv, EvaluationOutcome, StationEvaluation, StrategyEvaluator,
};
pub use frontier::{write_frontier_csv, FrontierExtractor};
pub use optimizer::solver::{BranchBoundSolver, MipModel, MipSolution, MipSolver, SolveLimits};
pub use optimizer::PlanOptimizer;
pub use orchestrator::{PlanningOrchestrator, PlanningResult};
