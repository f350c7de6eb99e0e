// ==========================================
// 共享单车再平衡调度系统 - 引擎层错误类型
// ==========================================
// 依据: Rust 错误处理最佳实践
// 工具: thiserror 派生宏
// 说明: 仅无可用部分结果的条件才是致命错误,
//       其余条件作为注解附着在所属实体上
// ==========================================

use thiserror::Error;

use crate::domain::types::InfeasibilityClass;
use crate::store::StoreError;

/// 规划流程错误类型
#[derive(Error, Debug)]
pub enum PlanningError {
    // ===== 数据相关 =====
    #[error("数据质量错误: {0}")]
    DataQuality(#[from] StoreError),

    #[error("站点网络为空, 无法规划")]
    EmptyNetwork,

    // ===== 优化相关 =====
    #[error("求解器不支持该模型: {0}")]
    SolverUnsupported(String),

    #[error("放松模型后仍不可行 (约束类别: {class:?})")]
    Infeasible { class: InfeasibilityClass },

    #[error("求解时限耗尽且无任何可行解")]
    NoIncumbent,

    // ===== 产物导出 =====
    #[error("CSV 导出失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
