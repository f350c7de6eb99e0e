// ==========================================
// 共享单车再平衡调度系统 - 批处理入口
// ==========================================
// 用途: 读取清洗后的参考周 CSV (可选当前周 CSV), 产出下周调度计划
// 使用:
//   bike-rebalancing-aps <reference_csv> [current_csv] [config_json] [output_dir]
// ==========================================

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use bike_rebalancing_aps::config::PlannerConfig;
use bike_rebalancing_aps::domain::station::WeekGrid;
use bike_rebalancing_aps::engine::{
    write_evaluation_csv, write_frontier_csv, BranchBoundSolver, PlanningOrchestrator,
};
use bike_rebalancing_aps::store::InMemoryTimeSeriesStore;
use bike_rebalancing_aps::{logging, APP_NAME, VERSION};

fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} - 决策支持系统", APP_NAME);
    tracing::info!("系统版本: {}", VERSION);
    tracing::info!("==================================================");

    let mut args = std::env::args().skip(1).peekable();
    let csv_path = match args.next() {
        Some(p) => PathBuf::from(p),
        None => {
            bail!("用法: bike-rebalancing-aps <reference_csv> [current_csv] [config_json] [output_dir]")
        }
    };
    // 第二个参数若为 CSV, 按当前周观测处理
    let current_path = match args.peek() {
        Some(p) if p.ends_with(".csv") => args.next().map(PathBuf::from),
        _ => None,
    };
    let config = match args.next() {
        Some(p) => PlannerConfig::load(Path::new(&p))
            .with_context(|| format!("配置加载失败: {}", p))?,
        None => {
            let config = PlannerConfig::default();
            config.validate().context("默认配置校验失败")?;
            config
        }
    };
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(|| ".".into());

    let grid = WeekGrid::new(config.planning.bins_per_day);
    let mut store = InMemoryTimeSeriesStore::from_clean_csv(&csv_path, grid)
        .with_context(|| format!("参考周 CSV 加载失败: {}", csv_path.display()))?;
    if let Some(path) = &current_path {
        store
            .load_current_csv(path)
            .with_context(|| format!("当前周 CSV 加载失败: {}", path.display()))?;
    }

    let solver = BranchBoundSolver;
    let orchestrator = PlanningOrchestrator::new(&config, &solver);
    let result = orchestrator.run(&store).context("规划流程失败")?;

    std::fs::create_dir_all(&output_dir)?;
    let plan_path = output_dir.join("plan.csv");
    result
        .plan
        .write_csv(&plan_path)
        .context("计划导出失败")?;
    write_evaluation_csv(&result.evaluations, &output_dir.join("evaluated_strategies.csv"))
        .context("评估明细导出失败")?;
    write_frontier_csv(&result.frontiers, &output_dir.join("frontier_strategies.csv"))
        .context("前沿导出失败")?;
    result
        .demand
        .write_csv(&output_dir.join("latent_demand.csv"))
        .context("重构需求导出失败")?;
    // 完整计划 (含求解统计) 以 JSON 归档
    let plan_json = serde_json::to_string_pretty(&result.plan)?;
    std::fs::write(output_dir.join("plan.json"), plan_json)?;

    tracing::info!(
        plan_id = %result.plan.plan_id,
        actions = result.plan.actions.len(),
        routes = result.plan.routes.len(),
        autopass = result.autopass_stations.len(),
        skipped = result.skipped_stations.len(),
        elapsed_ms = result.elapsed_ms,
        output = %plan_path.display(),
        "计划已导出"
    );
    Ok(())
}
