// ==========================================
// 规划全流程 E2E 测试
// ==========================================
// 职责: 验证 需求重构 → 策略评估 → 前沿提取 → 计划优化 的完整链路
// 场景: 健康网络自达标 / 贴底站点补车 / 贴顶站点收车
// ==========================================

use chrono::NaiveDate;

use bike_rebalancing_aps::config::PlannerConfig;
use bike_rebalancing_aps::domain::station::{StockSeries, WeekGrid};
use bike_rebalancing_aps::domain::types::{RegulationDirection, SolveStatus};
use bike_rebalancing_aps::engine::{
    BranchBoundSolver, FrontierExtractor, PlanningOrchestrator, StrategyEvaluator,
};
use bike_rebalancing_aps::store::InMemoryTimeSeriesStore;
use bike_rebalancing_aps::{DemandReconstructor, Station};

// ==========================================
// 测试辅助函数
// ==========================================

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 17).unwrap()
}

/// 小时粒度网格 (检查点 8/12/18 点直接对应桶 8/12/18)
fn hourly_grid() -> WeekGrid {
    WeekGrid::new(24)
}

fn add_station(
    store: &mut InMemoryTimeSeriesStore,
    station: Station,
    constant_stock: u32,
    grid: WeekGrid,
) {
    let series = StockSeries::new(
        &station.station_id,
        monday(),
        vec![constant_stock; grid.bins_per_week()],
    );
    store.insert_station(station, series).unwrap();
}

/// 单次搬运 8 辆的测试配置 (占容量 20 的 0.4, 落在走廊内)
fn small_load_config() -> PlannerConfig {
    let mut config = PlannerConfig::default();
    config.fleet.truck_load = 8;
    config.solver.time_limit_secs = 10;
    config.validate().unwrap();
    config
}

// ==========================================
// 场景: 健康网络自达标
// ==========================================

#[test]
fn test_healthy_network_yields_empty_plan() {
    let grid = hourly_grid();
    let mut store = InMemoryTimeSeriesStore::new(grid);
    add_station(
        &mut store,
        Station::new("S001", 20).with_coords(48.85, 2.35),
        10,
        grid,
    );
    add_station(
        &mut store,
        Station::new("S002", 30).with_coords(48.86, 2.36),
        12,
        grid,
    );

    let config = small_load_config();
    let solver = BranchBoundSolver;
    let result = PlanningOrchestrator::new(&config, &solver)
        .run(&store)
        .unwrap();

    // 库存恒处走廊内 → 所有站点 autopass, 空计划
    assert!(result.plan.actions.is_empty());
    assert!(result.plan.routes.is_empty());
    assert_eq!(result.plan.diagnostics.status, SolveStatus::Optimal);
    assert!(!result.plan.diagnostics.relaxed);
    assert_eq!(result.autopass_stations.len(), 2);
    assert_eq!(result.demand.diagnostics.censored_cells, 0);
}

// ==========================================
// 场景: 贴底站点补车
// ==========================================

#[test]
fn test_stuck_empty_station_gets_refill() {
    let grid = hourly_grid();
    let mut store = InMemoryTimeSeriesStore::new(grid);
    add_station(
        &mut store,
        Station::new("S001", 20).with_coords(48.85, 2.35),
        10,
        grid,
    );
    // 整周空库: 潜在需求被删失, 基准策略不可达标
    add_station(
        &mut store,
        Station::new("S002", 20).with_coords(48.86, 2.36),
        0,
        grid,
    );

    let config = small_load_config();
    let solver = BranchBoundSolver;
    let result = PlanningOrchestrator::new(&config, &solver)
        .run(&store)
        .unwrap();

    assert_eq!(result.autopass_stations, vec!["S001".to_string()]);
    assert_eq!(result.plan.actions.len(), 1);
    let action = &result.plan.actions[0];
    assert_eq!(action.station_id, "S002");
    assert_eq!(action.delta_bikes, 8);
    assert!(result.plan.diagnostics.routing_honored);
    assert_eq!(result.plan.routes.len(), 1);
    assert_eq!(result.plan.routes[0].stops.len(), 1);
}

// ==========================================
// 场景: 当前周观测覆盖起始库存
// ==========================================

#[test]
fn test_current_week_overrides_start_stock() {
    let grid = hourly_grid();
    let mut store = InMemoryTimeSeriesStore::new(grid);
    // 参考周健康 (恒为 10), 但当前周末尾已经掉到 0
    add_station(
        &mut store,
        Station::new("S001", 20).with_coords(48.85, 2.35),
        10,
        grid,
    );
    store
        .insert_current_week(
            "S001",
            StockSeries::new("S001", monday() + chrono::Duration::days(7), vec![10, 6, 2, 0]),
        )
        .unwrap();

    let config = small_load_config();
    let solver = BranchBoundSolver;
    let result = PlanningOrchestrator::new(&config, &solver)
        .run(&store)
        .unwrap();

    // 起始库存取当前周末尾观测 → 基准不再达标, 需要补车
    assert!(result.autopass_stations.is_empty());
    assert_eq!(result.plan.actions.len(), 1);
    assert_eq!(result.plan.actions[0].delta_bikes, 8);
}

// ==========================================
// 场景: 贴顶 + 贴底组合
// ==========================================

#[test]
fn test_stuck_full_and_empty_stations_get_opposite_actions() {
    let grid = hourly_grid();
    let mut store = InMemoryTimeSeriesStore::new(grid);
    add_station(
        &mut store,
        Station::new("S001", 20).with_coords(48.85, 2.35),
        0,
        grid,
    );
    add_station(
        &mut store,
        Station::new("S002", 20).with_coords(48.86, 2.36),
        20,
        grid,
    );

    let config = small_load_config();
    let solver = BranchBoundSolver;
    let result = PlanningOrchestrator::new(&config, &solver)
        .run(&store)
        .unwrap();

    assert_eq!(result.plan.actions.len(), 2);
    let refill = result
        .plan
        .actions
        .iter()
        .find(|a| a.station_id == "S001")
        .unwrap();
    let removal = result
        .plan
        .actions
        .iter()
        .find(|a| a.station_id == "S002")
        .unwrap();
    assert_eq!(refill.delta_bikes, 8);
    assert_eq!(removal.delta_bikes, -8);
    assert!(result.plan.diagnostics.routing_honored);

    // 每条路线任一时刻的累计载量可行
    for route in &result.plan.routes {
        let mut load: i64 = route.stops.iter().map(|s| s.delta_bikes.max(0)).sum();
        assert!(load <= config.fleet.truck_capacity as i64);
        for stop in &route.stops {
            load -= stop.delta_bikes;
            assert!((0..=config.fleet.truck_capacity as i64).contains(&load));
        }
    }
}

// ==========================================
// 场景: 前沿内容 (基准被排除)
// ==========================================

#[test]
fn test_frontier_replaces_failing_baseline_with_refill() {
    let grid = hourly_grid();
    let mut store = InMemoryTimeSeriesStore::new(grid);
    add_station(
        &mut store,
        Station::new("S002", 20).with_coords(48.86, 2.36),
        0,
        grid,
    );

    let config = small_load_config();
    let demand = DemandReconstructor::new(config.reconstruction.clone())
        .reconstruct(&store)
        .unwrap();
    let outcome = StrategyEvaluator::new(config.corridor, config.evaluation.clone(), config.fleet)
        .evaluate(&demand, &store)
        .unwrap();

    // 评估表: 基准恒在首位, 得分/成本在界内
    let table = &outcome.stations[0];
    assert!(table.strategies[0].strategy.is_baseline());
    for s in &table.strategies {
        assert!((0.0..=1.0).contains(&s.score));
        assert!(s.cost >= 0.0);
    }

    let sets = FrontierExtractor::new(config.corridor).extract(&outcome.stations);

    assert_eq!(sets.len(), 1);
    let set = &sets[0];
    assert!(!set.autopass);
    assert!(set.needs_regulation());
    // 不达标的基准被排除, 前沿成员全部是补车策略
    for member in &set.members {
        assert!(!member.strategy.is_baseline());
        assert_eq!(member.strategy.direction, RegulationDirection::Refill);
    }
}

// ==========================================
// 场景: 计划导出
// ==========================================

#[test]
fn test_plan_csv_export() {
    let grid = hourly_grid();
    let mut store = InMemoryTimeSeriesStore::new(grid);
    add_station(
        &mut store,
        Station::new("S002", 20).with_coords(48.86, 2.36),
        0,
        grid,
    );

    let config = small_load_config();
    let solver = BranchBoundSolver;
    let result = PlanningOrchestrator::new(&config, &solver)
        .run(&store)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.csv");
    result.plan.write_csv(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let mut lines = raw.lines();
    assert_eq!(lines.next(), Some("day,station,truck,delta_bikes"));
    assert_eq!(lines.next(), Some("0,S002,0,8"));

    // 诊断产物: 评估明细与前沿成员
    let eval_path = dir.path().join("evaluated_strategies.csv");
    bike_rebalancing_aps::engine::write_evaluation_csv(&result.evaluations, &eval_path).unwrap();
    let eval_raw = std::fs::read_to_string(&eval_path).unwrap();
    // 基准 + 两方向 × (2^7 - 1) 个模式, 每行一个策略
    assert_eq!(eval_raw.lines().count(), 1 + 1 + 2 * 127);

    let frontier_path = dir.path().join("frontier_strategies.csv");
    bike_rebalancing_aps::engine::write_frontier_csv(&result.frontiers, &frontier_path).unwrap();
    let frontier_raw = std::fs::read_to_string(&frontier_path).unwrap();
    assert!(frontier_raw.lines().count() >= 2);
}
