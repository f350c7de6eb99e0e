// ==========================================
// 共享单车再平衡调度系统 - 策略评估引擎
// ==========================================
// 职责: 对每个 (站点, 候选策略) 前向仿真一周库存轨迹并打分
// 说明: 各站点轨迹相互独立, 用 rayon 并行; 仿真本身删失感知,
//       溢出/穿底的需求被截断并计为未满足需求
// ==========================================

use std::path::Path;

use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{CorridorConfig, EvaluationConfig, FleetConfig};
use crate::domain::demand::LatentDemand;
use crate::domain::station::{Station, DAYS_PER_WEEK};
use crate::domain::strategy::{EvaluatedStrategy, Strategy};
use crate::domain::types::RegulationDirection;
use crate::engine::error::PlanningError;
use crate::store::TimeSeriesStore;

// ==========================================
// 评估结果容器
// ==========================================

/// 单站点的全部评估结果
#[derive(Debug, Clone)]
pub struct StationEvaluation {
    pub station_id: String,
    pub capacity: u32,
    pub strategies: Vec<EvaluatedStrategy>,
}

/// 评估阶段产出 (含退化站点注解)
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub stations: Vec<StationEvaluation>,
    /// (站点, 原因): 策略集为空或无效, 被排除但不阻塞整体流程
    pub skipped: Vec<(String, String)>,
}

/// 导出评估明细 CSV (诊断产物, 每行一个 (站点, 策略) 对)
pub fn write_evaluation_csv(
    stations: &[StationEvaluation],
    path: &Path,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "station",
        "strategy_index",
        "direction",
        "pattern",
        "quantity",
        "score",
        "cost",
        "applyable",
        "min_ratio",
        "max_ratio",
        "unmet_demand",
    ])?;
    for station in stations {
        for s in &station.strategies {
            writer.write_record([
                s.station_id.clone(),
                s.strategy_index.to_string(),
                s.strategy.direction.as_str().to_string(),
                s.strategy.pattern_string(),
                s.strategy.quantity.to_string(),
                format!("{:.6}", s.score),
                format!("{:.2}", s.cost),
                s.applyable.to_string(),
                format!("{:.4}", s.min_ratio),
                format!("{:.4}", s.max_ratio),
                format!("{:.2}", s.unmet_demand),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// 单次仿真的聚合指标
struct SimMetrics {
    applyable: bool,
    hits: usize,
    checks: usize,
    min_ratio: f64,
    max_ratio: f64,
    unmet: f64,
    total_abs_demand: f64,
}

// ==========================================
// StrategyEvaluator - 策略评估引擎
// ==========================================

pub struct StrategyEvaluator {
    corridor: CorridorConfig,
    evaluation: EvaluationConfig,
    fleet: FleetConfig,
}

impl StrategyEvaluator {
    pub fn new(corridor: CorridorConfig, evaluation: EvaluationConfig, fleet: FleetConfig) -> Self {
        Self {
            corridor,
            evaluation,
            fleet,
        }
    }

    /// 评估全网候选策略
    ///
    /// # 返回
    /// 每站点一张评估表; 基准策略 (不干预) 恒在表内作为参照点
    pub fn evaluate(
        &self,
        demand: &LatentDemand,
        store: &dyn TimeSeriesStore,
    ) -> Result<EvaluationOutcome, PlanningError> {
        let grid = demand.grid;
        let check_bins: Vec<usize> = self
            .evaluation
            .check_hours
            .iter()
            .map(|&h| grid.hour_to_bin(h))
            .collect();

        let stations = store.active_stations();
        info!(
            stations = stations.len(),
            strategies_per_station = self.candidate_count(),
            "开始策略评估"
        );

        // 站点间无交互, 并行 map
        let results: Vec<Result<Result<StationEvaluation, (String, String)>, PlanningError>> =
            stations
                .par_iter()
                .map(|station| self.evaluate_station(station, demand, store, &check_bins))
                .collect();

        let mut outcome = EvaluationOutcome {
            stations: Vec::new(),
            skipped: Vec::new(),
        };
        for result in results {
            match result? {
                Ok(eval) => outcome.stations.push(eval),
                Err(skip) => {
                    warn!(station = %skip.0, reason = %skip.1, "站点评估退化, 排除");
                    outcome.skipped.push(skip);
                }
            }
        }
        Ok(outcome)
    }

    /// 候选策略总数 (基准 + 两方向的非空按天位模式)
    fn candidate_count(&self) -> usize {
        1 + 2 * ((1 << DAYS_PER_WEEK) - 1)
    }

    fn evaluate_station(
        &self,
        station: &Station,
        demand: &LatentDemand,
        store: &dyn TimeSeriesStore,
        check_bins: &[usize],
    ) -> Result<Result<StationEvaluation, (String, String)>, PlanningError> {
        if station.capacity == 0 {
            return Ok(Err((
                station.station_id.clone(),
                "容量为 0, 策略集无效".to_string(),
            )));
        }
        let station_index = match demand.station_index(&station.station_id) {
            Some(i) => i,
            None => {
                return Ok(Err((
                    station.station_id.clone(),
                    "缺少重构需求".to_string(),
                )))
            }
        };

        // 起始库存: 当前周末尾观测优先, 否则参考周首桶
        let start = match store
            .current_week(&station.station_id)
            .and_then(|s| s.last_stock())
        {
            Some(stock) => stock as f64,
            None => store.reference_week(&station.station_id)?.stocks[0] as f64,
        };

        let station_demand = demand.station_demand(station_index);
        let capacity = station.capacity as f64;
        let quantity = self.fleet.truck_load;

        let mut strategies = Vec::new();
        let mut index = 0usize;

        // 基准策略恒在首位
        let baseline = Strategy::baseline(DAYS_PER_WEEK);
        strategies.push(self.evaluate_one(
            station,
            index,
            baseline,
            start,
            capacity,
            station_demand,
            check_bins,
        ));
        index += 1;

        // 结构性不可行: 单次搬运量超过站点容量, 仿真前排除
        if quantity as f64 > capacity {
            return Ok(Ok(StationEvaluation {
                station_id: station.station_id.clone(),
                capacity: station.capacity,
                strategies,
            }));
        }

        for direction in [RegulationDirection::Refill, RegulationDirection::Removal] {
            for pattern in 1u32..(1 << DAYS_PER_WEEK) {
                let day_pattern: Vec<bool> =
                    (0..DAYS_PER_WEEK).map(|d| pattern & (1 << d) != 0).collect();
                let strategy = Strategy::new(direction, day_pattern, quantity);
                strategies.push(self.evaluate_one(
                    station,
                    index,
                    strategy,
                    start,
                    capacity,
                    station_demand,
                    check_bins,
                ));
                index += 1;
            }
        }

        Ok(Ok(StationEvaluation {
            station_id: station.station_id.clone(),
            capacity: station.capacity,
            strategies,
        }))
    }

    fn evaluate_one(
        &self,
        station: &Station,
        strategy_index: usize,
        strategy: Strategy,
        start: f64,
        capacity: f64,
        demand: ArrayView2<'_, f64>,
        check_bins: &[usize],
    ) -> EvaluatedStrategy {
        let metrics = self.simulate(start, capacity, demand, &strategy, check_bins);

        // 得分 = 走廊命中率 × 未满足需求折减, 截断到 [0, 1]
        let hit_fraction = if metrics.checks > 0 {
            metrics.hits as f64 / metrics.checks as f64
        } else {
            0.0
        };
        let unmet_ratio = (metrics.unmet / (metrics.total_abs_demand + 1.0)).min(1.0);
        let score = (hit_fraction * (1.0 - unmet_ratio)).clamp(0.0, 1.0);

        let cost = strategy.bikes_moved() as f64
            + self.evaluation.visit_cost * strategy.visits() as f64;

        EvaluatedStrategy {
            station_id: station.station_id.clone(),
            strategy_index,
            strategy,
            score,
            cost,
            applyable: metrics.applyable,
            min_ratio: metrics.min_ratio,
            max_ratio: metrics.max_ratio,
            unmet_demand: metrics.unmet,
        }
    }

    /// 前向积分一周库存轨迹, 每步截断到 [0, capacity]
    fn simulate(
        &self,
        start: f64,
        capacity: f64,
        demand: ArrayView2<'_, f64>,
        strategy: &Strategy,
        check_bins: &[usize],
    ) -> SimMetrics {
        let tolerance = self.evaluation.apply_tolerance as f64;
        let (n_days, bins_per_day) = demand.dim();

        let mut x = start.clamp(0.0, capacity);
        let mut metrics = SimMetrics {
            applyable: true,
            hits: 0,
            checks: 0,
            min_ratio: f64::INFINITY,
            max_ratio: f64::NEG_INFINITY,
            unmet: 0.0,
            total_abs_demand: 0.0,
        };

        for day in 0..n_days {
            // 日初干预: 超出容忍区间视为不可落地
            let delta = strategy.delta_on(day) as f64;
            if delta != 0.0 {
                let test = x + delta;
                if test < -tolerance || test > capacity + tolerance {
                    metrics.applyable = false;
                }
                x = test.clamp(0.0, capacity);
            }

            for bin in 0..bins_per_day {
                let flow = demand[[day, bin]];
                metrics.total_abs_demand += flow.abs();

                let next = x + flow;
                let clipped = next.clamp(0.0, capacity);
                metrics.unmet += (next - clipped).abs();
                x = clipped;

                if check_bins.contains(&bin) {
                    metrics.checks += 1;
                    let ratio = x / capacity;
                    metrics.min_ratio = metrics.min_ratio.min(ratio);
                    metrics.max_ratio = metrics.max_ratio.max(ratio);
                    if ratio >= self.corridor.empty_ratio && ratio <= self.corridor.full_ratio {
                        metrics.hits += 1;
                    }
                }
            }
        }

        if metrics.checks == 0 {
            metrics.min_ratio = 0.0;
            metrics.max_ratio = 0.0;
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use ndarray::Array2;

    fn evaluator() -> StrategyEvaluator {
        let config = PlannerConfig::default();
        StrategyEvaluator::new(config.corridor, config.evaluation, config.fleet)
    }

    #[test]
    fn test_flat_interior_stock_scores_full() {
        // 容量 20, 库存恒为 10, 需求恒 0 → 每个检查点都在走廊内
        let demand = Array2::zeros((7, 72));
        let station = Station::new("S001", 20);
        let strategy = Strategy::baseline(7);
        let evaluated = evaluator().evaluate_one(
            &station,
            0,
            strategy,
            10.0,
            20.0,
            demand.view(),
            &[24, 36, 54],
        );
        assert!((evaluated.score - 1.0).abs() < 1e-12);
        assert_eq!(evaluated.cost, 0.0);
        assert!(evaluated.applyable);
    }

    #[test]
    fn test_stuck_empty_baseline_scores_zero() {
        let demand = Array2::zeros((7, 72));
        let station = Station::new("S002", 20);
        let strategy = Strategy::baseline(7);
        let evaluated = evaluator().evaluate_one(
            &station,
            0,
            strategy,
            0.0,
            20.0,
            demand.view(),
            &[24, 36, 54],
        );
        assert_eq!(evaluated.score, 0.0);
    }

    #[test]
    fn test_unmet_demand_lowers_score() {
        // 强负需求把库存压穿 0, 截断量计入未满足需求
        let mut demand = Array2::zeros((7, 72));
        demand[[0, 0]] = -30.0;
        let station = Station::new("S003", 20);
        let strategy = Strategy::baseline(7);
        let evaluated = evaluator().evaluate_one(
            &station,
            0,
            strategy,
            10.0,
            20.0,
            demand.view(),
            &[24],
        );
        assert!(evaluated.unmet_demand > 0.0);
        assert!(evaluated.score < 1.0);
        assert!(evaluated.score >= 0.0);
    }

    #[test]
    fn test_non_applyable_refill_flagged() {
        // 库存 18 容量 20, 再补 15 超出容忍区间
        let demand = Array2::zeros((7, 72));
        let station = Station::new("S004", 20);
        let strategy = Strategy::new(
            RegulationDirection::Refill,
            vec![true, false, false, false, false, false, false],
            15,
        );
        let evaluated =
            evaluator().evaluate_one(&station, 1, strategy, 18.0, 20.0, demand.view(), &[24]);
        assert!(!evaluated.applyable);
    }
}
