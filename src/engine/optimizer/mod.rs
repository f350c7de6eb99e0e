// ==========================================
// 共享单车再平衡调度系统 - 计划优化引擎
// ==========================================
// 职责: 两阶段求解编排 (访问层 → 路由层) 与降级阶梯
// 降级阶梯: 完整模型 → (报告不可行时) 放松模型 → 报错;
//           超时且无在手解直接致命, 不进入放松;
//           路由失败不阻塞计划, 退化为贪心派车并标记 routing_honored=false
// ==========================================

pub mod planroute;
pub mod planvisit;
pub mod solver;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::PlannerConfig;
use crate::domain::plan::{
    RegulationAction, RegulationPlan, SolveDiagnostics, TruckRoute, TruckStop,
};
use crate::domain::station::{Station, DAYS_PER_WEEK};
use crate::domain::strategy::ParetoSet;
use crate::domain::types::{InfeasibilityClass, SolveStatus};
use crate::engine::error::PlanningError;
use crate::engine::optimizer::planroute::{haversine_km, DayVisit, RouteModelBuilder};
use crate::engine::optimizer::planvisit::{VisitModel, VisitModelBuilder};
use crate::engine::optimizer::solver::{MipSolution, MipSolver, SolveLimits};
use crate::store::TimeSeriesStore;

// ==========================================
// PlanOptimizer - 计划优化引擎
// ==========================================

pub struct PlanOptimizer<'a> {
    config: &'a PlannerConfig,
    solver: &'a dyn MipSolver,
}

/// 访问层求解结果 (含降级标记)
struct VisitOutcome {
    model: VisitModel,
    solution: MipSolution,
    relaxed: bool,
    infeasibility: Option<InfeasibilityClass>,
}

/// 单日路由求解的三种结局
enum RouteAttempt {
    Solved(Vec<TruckRoute>),
    Infeasible,
    NoSolution,
}

impl<'a> PlanOptimizer<'a> {
    pub fn new(config: &'a PlannerConfig, solver: &'a dyn MipSolver) -> Self {
        Self { config, solver }
    }

    /// 两阶段求解: 选策略, 再逐日排路线
    ///
    /// # 参数
    /// - sets: 前沿提取产出的全部站点 (autopass 在此处被过滤)
    /// - store: 站点坐标查询
    pub fn optimize(
        &self,
        sets: &[ParetoSet],
        store: &dyn TimeSeriesStore,
    ) -> Result<RegulationPlan, PlanningError> {
        let started = Instant::now();
        let active: Vec<&ParetoSet> = sets.iter().filter(|s| s.needs_regulation()).collect();

        if active.is_empty() {
            info!("全网自达标, 产出空计划");
            return Ok(RegulationPlan::empty(SolveDiagnostics {
                status: SolveStatus::Optimal,
                objective: 0.0,
                gap: 0.0,
                elapsed_ms: started.elapsed().as_millis() as i64,
                relaxed: false,
                routing_honored: true,
                infeasibility: None,
            }));
        }

        info!(stations = active.len(), "开始访问计划求解");
        let visit = self.solve_visits(&active)?;

        // 解码 (站点, 策略) 选择 → 按天聚合动作
        let selections = visit.model.decode(&visit.solution);
        let mut day_visits: Vec<Vec<DayVisit>> = vec![Vec::new(); DAYS_PER_WEEK];
        let coords: HashMap<&str, &Station> = store
            .stations()
            .iter()
            .map(|s| (s.station_id.as_str(), s))
            .collect();
        for (set_index, member_index) in &selections {
            let set = active[*set_index];
            let member = &set.members[*member_index];
            let station = coords.get(set.station_id.as_str());
            for day in 0..DAYS_PER_WEEK {
                let delta = member.strategy.delta_on(day);
                if delta == 0 {
                    continue;
                }
                let (latitude, longitude) = match station {
                    Some(s) => (s.latitude, s.longitude),
                    None => (0.0, 0.0),
                };
                day_visits[day].push(DayVisit {
                    station_id: set.station_id.clone(),
                    delta_bikes: delta,
                    latitude,
                    longitude,
                });
            }
        }

        // 路由层: 每个有访问的天一个独立模型, 均分剩余时限
        let busy_days = day_visits.iter().filter(|v| !v.is_empty()).count();
        let day_limit = if busy_days > 0 {
            Duration::from_secs(
                (self.config.solver.time_limit_secs / busy_days as u64).max(1),
            )
        } else {
            Duration::from_secs(1)
        };

        let mut actions = Vec::new();
        let mut routes = Vec::new();
        let mut routing_honored = true;
        let mut infeasibility = visit.infeasibility;
        let route_builder = RouteModelBuilder::new(self.config);

        for (day, visits) in day_visits.iter().enumerate() {
            if visits.is_empty() {
                continue;
            }
            let day_routes = match self.solve_day_routes(&route_builder, visits, day, day_limit) {
                RouteAttempt::Solved(day_routes) => day_routes,
                attempt => {
                    warn!(day, stations = visits.len(), "路由求解失败, 退化为贪心派车");
                    routing_honored = false;
                    // 路由模型不可行 = 当日访问量超出车队的服务时间窗
                    if matches!(attempt, RouteAttempt::Infeasible) && infeasibility.is_none() {
                        infeasibility = Some(InfeasibilityClass::TimeWindow);
                    }
                    self.greedy_routes(visits, day)
                }
            };
            for route in &day_routes {
                for stop in &route.stops {
                    actions.push(RegulationAction {
                        day,
                        station_id: stop.station_id.clone(),
                        truck_id: route.truck_id,
                        delta_bikes: stop.delta_bikes,
                    });
                }
            }
            routes.extend(day_routes);
        }

        let diagnostics = SolveDiagnostics {
            status: visit.solution.status,
            objective: visit.solution.objective,
            gap: visit.solution.gap,
            elapsed_ms: started.elapsed().as_millis() as i64,
            relaxed: visit.relaxed,
            routing_honored,
            infeasibility,
        };
        info!(
            actions = actions.len(),
            routes = routes.len(),
            relaxed = diagnostics.relaxed,
            routing_honored,
            "计划求解完成"
        );
        Ok(RegulationPlan::new(actions, routes, diagnostics))
    }

    /// 访问层降级阶梯: 完整模型 → (报告不可行时) 放松模型 → 报错
    ///
    /// 超时且无在手解不进入放松: 放松不改变时限, 该周期直接致命。
    fn solve_visits(&self, active: &[&ParetoSet]) -> Result<VisitOutcome, PlanningError> {
        let builder = VisitModelBuilder::new(self.config);
        let limits = SolveLimits::new(
            Duration::from_secs(self.config.solver.time_limit_secs),
            self.config.solver.gap_tolerance,
        );

        let model = builder.build(active, false);
        let solution = self
            .solver
            .solve(&model.model, &limits)
            .map_err(|e| PlanningError::SolverUnsupported(e.to_string()))?;
        if solution.status.has_solution() {
            return Ok(VisitOutcome {
                model,
                solution,
                relaxed: false,
                infeasibility: None,
            });
        }
        match solution.status {
            SolveStatus::Infeasible => {}
            SolveStatus::NoIncumbent => return Err(PlanningError::NoIncumbent),
            status => {
                return Err(PlanningError::SolverUnsupported(format!(
                    "访问模型求解状态异常: {}",
                    status.as_str()
                )))
            }
        }

        warn!("完整访问模型不可行, 重建放松模型 (丢弃逐日耦合约束)");
        let relaxed_model = builder.build(active, true);
        let relaxed_solution = self
            .solver
            .solve(&relaxed_model.model, &limits)
            .map_err(|e| PlanningError::SolverUnsupported(e.to_string()))?;
        if relaxed_solution.status.has_solution() {
            let selections = relaxed_model.decode(&relaxed_solution);
            let class = self.classify_dropped_violation(&selections, active);
            return Ok(VisitOutcome {
                model: relaxed_model,
                solution: relaxed_solution,
                relaxed: true,
                infeasibility: Some(class),
            });
        }

        match relaxed_solution.status {
            SolveStatus::NoIncumbent => Err(PlanningError::NoIncumbent),
            // 放松后仅剩单站选择约束
            _ => Err(PlanningError::Infeasible {
                class: InfeasibilityClass::StationCount,
            }),
        }
    }

    /// 放松解违反了哪组被丢弃的逐日耦合约束
    fn classify_dropped_violation(
        &self,
        selections: &[(usize, usize)],
        active: &[&ParetoSet],
    ) -> InfeasibilityClass {
        let mut day_count = [0usize; DAYS_PER_WEEK];
        let mut day_load = [[0i64; 2]; DAYS_PER_WEEK];
        for (set_index, member_index) in selections {
            let member = &active[*set_index].members[*member_index];
            for day in 0..DAYS_PER_WEEK {
                let delta = member.strategy.delta_on(day);
                if delta == 0 {
                    continue;
                }
                day_count[day] += 1;
                let side = if delta > 0 { 0 } else { 1 };
                day_load[day][side] += delta.abs();
            }
        }

        let fleet_load =
            self.config.fleet.fleet_size as i64 * self.config.fleet.truck_capacity as i64;
        let count_exceeded = day_count
            .iter()
            .any(|&c| c > self.config.planning.max_stations_per_day);
        let load_exceeded = day_load.iter().flatten().any(|&l| l > fleet_load);
        if count_exceeded && !load_exceeded {
            InfeasibilityClass::StationCount
        } else {
            InfeasibilityClass::FleetCapacity
        }
    }

    /// 单日路由求解; 区分模型不可行与超时/拒绝无解
    fn solve_day_routes(
        &self,
        builder: &RouteModelBuilder,
        visits: &[DayVisit],
        day: usize,
        limit: Duration,
    ) -> RouteAttempt {
        let route_model = builder.build(visits);
        let limits = SolveLimits::new(limit, self.config.solver.gap_tolerance);
        let solution = match self.solver.solve(&route_model.model, &limits) {
            Ok(solution) => solution,
            Err(e) => {
                warn!(day, error = %e, "路由模型被求解器拒绝");
                return RouteAttempt::NoSolution;
            }
        };
        if solution.status.has_solution() {
            return RouteAttempt::Solved(builder.decode(visits, &route_model, &solution, day));
        }
        match solution.status {
            SolveStatus::Infeasible => RouteAttempt::Infeasible,
            _ => RouteAttempt::NoSolution,
        }
    }

    /// 贪心派车: 按方向分组, 载量装满即换下一辆车
    ///
    /// 不保证行驶距离最优, 但保证每条路线的载量可行。
    fn greedy_routes(&self, visits: &[DayVisit], day: usize) -> Vec<TruckRoute> {
        let capacity = self.config.fleet.truck_capacity as i64;
        let mut routes: Vec<TruckRoute> = Vec::new();
        let mut truck_id = 0usize;

        for sign in [1i64, -1i64] {
            let group: Vec<&DayVisit> =
                visits.iter().filter(|v| v.delta_bikes.signum() == sign).collect();
            let mut stops: Vec<TruckStop> = Vec::new();
            let mut load = 0i64;
            for visit in group {
                let amount = visit.delta_bikes.abs();
                if load + amount > capacity && !stops.is_empty() {
                    routes.push(Self::finish_route(day, truck_id, stops, visits));
                    truck_id += 1;
                    stops = Vec::new();
                    load = 0;
                }
                load += amount;
                stops.push(TruckStop {
                    seq: stops.len() + 1,
                    station_id: visit.station_id.clone(),
                    delta_bikes: visit.delta_bikes,
                });
            }
            if !stops.is_empty() {
                routes.push(Self::finish_route(day, truck_id, stops, visits));
                truck_id += 1;
            }
        }
        routes
    }

    fn finish_route(
        day: usize,
        truck_id: usize,
        stops: Vec<TruckStop>,
        visits: &[DayVisit],
    ) -> TruckRoute {
        let coords: HashMap<&str, (f64, f64)> = visits
            .iter()
            .map(|v| (v.station_id.as_str(), (v.latitude, v.longitude)))
            .collect();
        let mut distance_km = 0.0;
        for pair in stops.windows(2) {
            if let (Some(&(lat1, lon1)), Some(&(lat2, lon2))) = (
                coords.get(pair[0].station_id.as_str()),
                coords.get(pair[1].station_id.as_str()),
            ) {
                distance_km += haversine_km(lat1, lon1, lat2, lon2);
            }
        }
        TruckRoute {
            day,
            truck_id,
            stops,
            distance_km,
        }
    }
}
