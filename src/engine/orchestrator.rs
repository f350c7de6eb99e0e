// ==========================================
// 共享单车再平衡调度系统 - 规划编排器
// ==========================================
// 职责: 协调四大核心引擎的执行顺序
//       需求重构 → 策略评估 → 前沿提取 → 计划优化
// 红线: 阶段间单向数据流, 后级不回写前级产物
// ==========================================

use std::time::Instant;

use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::domain::demand::LatentDemand;
use crate::domain::plan::RegulationPlan;
use crate::domain::strategy::ParetoSet;
use crate::engine::demand::DemandReconstructor;
use crate::engine::error::PlanningError;
use crate::engine::evaluation::{StationEvaluation, StrategyEvaluator};
use crate::engine::frontier::FrontierExtractor;
use crate::engine::optimizer::solver::MipSolver;
use crate::engine::optimizer::PlanOptimizer;
use crate::store::TimeSeriesStore;

// ==========================================
// PlanningResult - 规划结果
// ==========================================

/// 一次完整规划周期的产物与各阶段诊断
#[derive(Debug, Clone)]
pub struct PlanningResult {
    // 计划优化输出
    pub plan: RegulationPlan,

    // 需求重构输出 (含收敛诊断)
    pub demand: LatentDemand,

    // 中间产物 (诊断导出用)
    pub evaluations: Vec<StationEvaluation>,
    pub frontiers: Vec<ParetoSet>,

    // 各阶段注解
    pub autopass_stations: Vec<String>,
    pub skipped_stations: Vec<(String, String)>,

    pub elapsed_ms: i64,
}

// ==========================================
// PlanningOrchestrator - 规划编排器
// ==========================================

pub struct PlanningOrchestrator<'a> {
    config: &'a PlannerConfig,
    solver: &'a dyn MipSolver,
    reconstructor: DemandReconstructor,
    evaluator: StrategyEvaluator,
    extractor: FrontierExtractor,
}

impl<'a> PlanningOrchestrator<'a> {
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - config: 已校验的规划配置
    /// - solver: 混合整数求解引擎 (外部协作方或内置弱实现)
    pub fn new(config: &'a PlannerConfig, solver: &'a dyn MipSolver) -> Self {
        Self {
            reconstructor: DemandReconstructor::new(config.reconstruction.clone()),
            evaluator: StrategyEvaluator::new(
                config.corridor,
                config.evaluation.clone(),
                config.fleet,
            ),
            extractor: FrontierExtractor::new(config.corridor),
            config,
            solver,
        }
    }

    /// 执行完整规划流程 (参考周 → 下周计划)
    ///
    /// # 返回
    /// 调度计划与各阶段诊断; 仅在无任何可用部分结果时返回错误
    pub fn run(&self, store: &dyn TimeSeriesStore) -> Result<PlanningResult, PlanningError> {
        let started = Instant::now();
        info!(
            stations = store.active_stations().len(),
            "开始规划周期"
        );

        // ==========================================
        // 步骤1: 需求重构 - 反演潜在净需求
        // ==========================================
        debug!("步骤1: 需求重构");
        let demand = self.reconstructor.reconstruct(store)?;

        // ==========================================
        // 步骤2: 策略评估 - 前向仿真打分
        // ==========================================
        debug!("步骤2: 策略评估");
        let evaluation = self.evaluator.evaluate(&demand, store)?;

        // ==========================================
        // 步骤3: 前沿提取 - 非支配子集
        // ==========================================
        debug!("步骤3: 前沿提取");
        let sets = self.extractor.extract(&evaluation.stations);
        let autopass_stations: Vec<String> = sets
            .iter()
            .filter(|s| s.autopass)
            .map(|s| s.station_id.clone())
            .collect();

        // ==========================================
        // 步骤4: 计划优化 - 两阶段求解
        // ==========================================
        debug!("步骤4: 计划优化");
        let optimizer = PlanOptimizer::new(self.config, self.solver);
        let plan = optimizer.optimize(&sets, store)?;

        let elapsed_ms = started.elapsed().as_millis() as i64;
        info!(
            evaluated = evaluation.stations.len(),
            frontier = sets.len(),
            autopass = autopass_stations.len(),
            actions = plan.actions.len(),
            elapsed_ms,
            "规划周期完成"
        );

        Ok(PlanningResult {
            plan,
            demand,
            evaluations: evaluation.stations,
            frontiers: sets,
            autopass_stations,
            skipped_stations: evaluation.skipped,
            elapsed_ms,
        })
    }
}
