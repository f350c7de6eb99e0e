// ==========================================
// 需求重构引擎集成测试
// ==========================================
// 职责: 验证存储层 → 需求重构的完整链路
// 不变量: 非删失桶的输出等于观测净流量
// ==========================================

use chrono::NaiveDate;

use bike_rebalancing_aps::config::ReconstructionConfig;
use bike_rebalancing_aps::domain::station::{StockSeries, WeekGrid};
use bike_rebalancing_aps::engine::DemandReconstructor;
use bike_rebalancing_aps::store::InMemoryTimeSeriesStore;
use bike_rebalancing_aps::Station;

// ==========================================
// 测试辅助函数
// ==========================================

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 17).unwrap()
}

fn store_with_series(entries: Vec<(Station, Vec<u32>)>, grid: WeekGrid) -> InMemoryTimeSeriesStore {
    let mut store = InMemoryTimeSeriesStore::new(grid);
    for (station, stocks) in entries {
        let series = StockSeries::new(&station.station_id, monday(), stocks);
        store.insert_station(station, series).unwrap();
    }
    store
}

/// 在容量内部小幅波动的库存序列 (无删失)
fn interior_stocks(grid: WeekGrid, base: u32) -> Vec<u32> {
    (0..grid.bins_per_week())
        .map(|lin| base + ((lin % 5) as u32))
        .collect()
}

// ==========================================
// 测试用例
// ==========================================

#[test]
fn test_uncensored_bins_equal_observed_flow() {
    let grid = WeekGrid::new(24);
    let stocks = interior_stocks(grid, 10);
    let store = store_with_series(vec![(Station::new("S001", 30), stocks.clone())], grid);

    let reconstructor = DemandReconstructor::new(ReconstructionConfig::default());
    let demand = reconstructor.reconstruct(&store).unwrap();

    assert_eq!(demand.diagnostics.censored_cells, 0);
    assert!(demand.diagnostics.converged);

    // 首桶无前驱, 净流量按 0 记
    assert_eq!(demand.demand[[0, 0, 0]], 0.0);
    // 其余非删失桶严格等于库存差分
    for day in 0..7 {
        for bin in 0..grid.bins_per_day {
            let lin = grid.linear_index(day, bin);
            if lin == 0 {
                continue;
            }
            let expected = stocks[lin] as f64 - stocks[lin - 1] as f64;
            assert!(
                (demand.demand[[0, day, bin]] - expected).abs() < 1e-12,
                "非删失桶被改写: day={} bin={}",
                day,
                bin
            );
        }
    }
}

#[test]
fn test_large_interior_flow_not_clipped() {
    // 净流量 ±8 超出默认插补限幅 5, 但全部桶均为内点, 必须原样保留
    let grid = WeekGrid::new(24);
    let stocks: Vec<u32> = (0..grid.bins_per_week())
        .map(|lin| if lin % 2 == 0 { 10 } else { 18 })
        .collect();
    let store = store_with_series(vec![(Station::new("S001", 40), stocks)], grid);

    let reconstructor = DemandReconstructor::new(ReconstructionConfig::default());
    let demand = reconstructor.reconstruct(&store).unwrap();

    assert_eq!(demand.diagnostics.censored_cells, 0);
    assert_eq!(demand.demand[[0, 0, 1]], 8.0);
    assert_eq!(demand.demand[[0, 0, 2]], -8.0);
}

#[test]
fn test_boundary_stuck_station_flagged_low_confidence() {
    let grid = WeekGrid::new(24);
    let healthy = interior_stocks(grid, 10);
    let stuck_full = vec![20u32; grid.bins_per_week()];
    let store = store_with_series(
        vec![
            (Station::new("S001", 30), healthy),
            (Station::new("S002", 20), stuck_full),
        ],
        grid,
    );

    let reconstructor = DemandReconstructor::new(ReconstructionConfig::default());
    let demand = reconstructor.reconstruct(&store).unwrap();

    // 整周贴着容量边界 → 除首桶外全部删失, 标记低置信度
    assert!(demand.diagnostics.censored_cells > 0);
    assert_eq!(
        demand.diagnostics.low_confidence_stations,
        vec!["S002".to_string()]
    );

    // 健康站点不受邻站删失影响
    let healthy_index = demand.station_index("S001").unwrap();
    assert_eq!(demand.demand[[healthy_index, 0, 0]], 0.0);
}

#[test]
fn test_excluded_station_not_reconstructed() {
    let grid = WeekGrid::new(24);
    let mut excluded = Station::new("S003", 20);
    excluded.excluded = true;
    let store = store_with_series(
        vec![
            (Station::new("S001", 30), interior_stocks(grid, 10)),
            (excluded, interior_stocks(grid, 5)),
        ],
        grid,
    );

    let reconstructor = DemandReconstructor::new(ReconstructionConfig::default());
    let demand = reconstructor.reconstruct(&store).unwrap();

    assert_eq!(demand.station_ids, vec!["S001".to_string()]);
    assert!(demand.station_index("S003").is_none());
}

#[test]
fn test_empty_network_is_fatal() {
    let store = InMemoryTimeSeriesStore::new(WeekGrid::new(24));
    let reconstructor = DemandReconstructor::new(ReconstructionConfig::default());
    assert!(reconstructor.reconstruct(&store).is_err());
}
