// ==========================================
// 共享单车再平衡调度系统 - 卡车路由模型 (路由层)
// ==========================================
// 职责: 对单日已选访问集合构建容量约束 VRP 模型
// 图结构: 统一节点图 (仓库 + 补车站 + 收车站), 仓库弧距离为 0,
//         同类型站点相邻停靠加距离惩罚, 候选弧取 k 近邻
// 子回路消除: 按方向分离的单商品整数流, 同时约束车载量
// ==========================================

use crate::config::PlannerConfig;
use crate::domain::plan::{TruckRoute, TruckStop};
use crate::engine::optimizer::solver::{CmpOp, MipModel, MipSolution, VarId};

/// 地球半径 (km), 大圆距离换算
const EARTH_RADIUS_KM: f64 = 6371.0;

/// 大圆距离 (与原始坐标均为度)
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

// ==========================================
// 模型结构
// ==========================================

/// 单日需要卡车到场的一次访问
#[derive(Debug, Clone)]
pub struct DayVisit {
    pub station_id: String,
    pub delta_bikes: i64, // 正 = 投放 (补车), 负 = 回收 (收车)
    pub latitude: f64,
    pub longitude: f64,
}

/// 一条候选弧 (节点 0 为仓库)
#[derive(Debug, Clone, Copy)]
struct Arc {
    from: usize,
    to: usize,
    x: VarId,      // 弧选择
    f_ref: VarId,  // 补车流量 (车上待投放数)
    f_rem: VarId,  // 收车流量 (车上已回收数)
}

/// 构建完成的单日路由模型
pub struct RouteModel {
    pub model: MipModel,
    arcs: Vec<Arc>,
    n_nodes: usize,
}

// ==========================================
// RouteModelBuilder - 建模器
// ==========================================

pub struct RouteModelBuilder<'a> {
    config: &'a PlannerConfig,
}

impl<'a> RouteModelBuilder<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// 带同类型惩罚的弧距离 (仓库弧为 0)
    fn arc_distance(&self, visits: &[DayVisit], from: usize, to: usize) -> f64 {
        if from == 0 || to == 0 {
            return 0.0;
        }
        let a = &visits[from - 1];
        let b = &visits[to - 1];
        let mut distance = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
        if a.delta_bikes.signum() == b.delta_bikes.signum() {
            distance += self.config.planning.same_type_penalty_km;
        }
        distance
    }

    /// 节点 from 的候选后继 (k 近邻 + 仓库)
    fn candidate_successors(&self, visits: &[DayVisit], from: usize) -> Vec<usize> {
        let n_nodes = visits.len() + 1;
        if from == 0 {
            // 仓库可达所有站点
            return (1..n_nodes).collect();
        }
        let mut others: Vec<usize> = (1..n_nodes).filter(|&j| j != from).collect();
        others.sort_by(|&a, &b| {
            self.arc_distance(visits, from, a)
                .partial_cmp(&self.arc_distance(visits, from, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        others.truncate(self.config.planning.topk_arcs);
        others.push(0); // 返回仓库恒为候选
        others
    }

    /// 构建单日容量约束 VRP 模型
    pub fn build(&self, visits: &[DayVisit]) -> RouteModel {
        let n_nodes = visits.len() + 1;
        let mut model = MipModel::new("truck_routes");
        let capacity = self.config.fleet.truck_capacity as i64;

        // 变量: 候选弧 + 两方向整数流
        let mut arcs: Vec<Arc> = Vec::new();
        for from in 0..n_nodes {
            for to in self.candidate_successors(visits, from) {
                let distance = self.arc_distance(visits, from, to);
                let x = model.add_binary(format!("x_{}_{}", from, to), -distance);
                let f_ref = model.add_integer(format!("fref_{}_{}", from, to), 0, capacity, 0.0);
                let f_rem = model.add_integer(format!("frem_{}_{}", from, to), 0, capacity, 0.0);
                arcs.push(Arc {
                    from,
                    to,
                    x,
                    f_ref,
                    f_rem,
                });
            }
        }

        // 弧未选中时流量为 0, 选中时合计载量不超过卡车容量
        for arc in &arcs {
            model.add_constraint(
                format!("load_{}_{}", arc.from, arc.to),
                vec![
                    (arc.f_ref, 1.0),
                    (arc.f_rem, 1.0),
                    (arc.x, -(capacity as f64)),
                ],
                CmpOp::Le,
                0.0,
            );
        }

        // 每个站点节点恰好一进一出
        for node in 1..n_nodes {
            let out_terms: Vec<(VarId, f64)> = arcs
                .iter()
                .filter(|a| a.from == node)
                .map(|a| (a.x, 1.0))
                .collect();
            let in_terms: Vec<(VarId, f64)> = arcs
                .iter()
                .filter(|a| a.to == node)
                .map(|a| (a.x, 1.0))
                .collect();
            model.add_constraint(format!("out_{}", node), out_terms, CmpOp::Eq, 1.0);
            model.add_constraint(format!("in_{}", node), in_terms, CmpOp::Eq, 1.0);
        }

        // 仓库: 出车数不超过车队规模, 且有出必有回
        let depot_out: Vec<(VarId, f64)> = arcs
            .iter()
            .filter(|a| a.from == 0)
            .map(|a| (a.x, 1.0))
            .collect();
        model.add_constraint(
            "depot_fleet".to_string(),
            depot_out.clone(),
            CmpOp::Le,
            self.config.fleet.fleet_size as f64,
        );
        let mut depot_balance = depot_out;
        for arc in arcs.iter().filter(|a| a.to == 0) {
            depot_balance.push((arc.x, -1.0));
        }
        model.add_constraint("depot_balance".to_string(), depot_balance, CmpOp::Eq, 0.0);

        // 流守恒: 补车流在补车站被消耗, 收车流在收车站被产生
        // (同时保证任何回路必须经过仓库)
        for node in 1..n_nodes {
            let delta = visits[node - 1].delta_bikes;
            let mut ref_terms: Vec<(VarId, f64)> = Vec::new();
            let mut rem_terms: Vec<(VarId, f64)> = Vec::new();
            for arc in &arcs {
                if arc.to == node {
                    ref_terms.push((arc.f_ref, 1.0));
                    rem_terms.push((arc.f_rem, -1.0));
                }
                if arc.from == node {
                    ref_terms.push((arc.f_ref, -1.0));
                    rem_terms.push((arc.f_rem, 1.0));
                }
            }
            let refill_demand = if delta > 0 { delta as f64 } else { 0.0 };
            let removal_demand = if delta < 0 { (-delta) as f64 } else { 0.0 };
            model.add_constraint(
                format!("flow_ref_{}", node),
                ref_terms,
                CmpOp::Eq,
                refill_demand,
            );
            model.add_constraint(
                format!("flow_rem_{}", node),
                rem_terms,
                CmpOp::Eq,
                removal_demand,
            );
        }

        RouteModel {
            model,
            arcs,
            n_nodes,
        }
    }

    /// 从求解结果还原卡车路线 (沿仓库出弧逐条追踪)
    pub fn decode(
        &self,
        visits: &[DayVisit],
        route_model: &RouteModel,
        solution: &MipSolution,
        day: usize,
    ) -> Vec<TruckRoute> {
        // 每个节点的被选后继
        let mut successor = vec![None; route_model.n_nodes];
        let mut depot_starts = Vec::new();
        for arc in &route_model.arcs {
            if solution.is_one(arc.x) {
                if arc.from == 0 {
                    depot_starts.push(arc.to);
                } else {
                    successor[arc.from] = Some(arc.to);
                }
            }
        }
        depot_starts.sort_unstable();

        let mut routes = Vec::new();
        for (truck_id, &start) in depot_starts.iter().enumerate() {
            let mut stops = Vec::new();
            let mut distance_km = 0.0;
            let mut node = start;
            let mut prev = 0usize;
            let mut seq = 1usize;
            // 网格有限, 防御性限步
            for _ in 0..route_model.n_nodes {
                if node == 0 {
                    break;
                }
                let visit = &visits[node - 1];
                stops.push(TruckStop {
                    seq,
                    station_id: visit.station_id.clone(),
                    delta_bikes: visit.delta_bikes,
                });
                if prev != 0 {
                    distance_km += haversine_km(
                        visits[prev - 1].latitude,
                        visits[prev - 1].longitude,
                        visit.latitude,
                        visit.longitude,
                    );
                }
                seq += 1;
                prev = node;
                node = match successor[node] {
                    Some(next) => next,
                    None => break,
                };
            }
            routes.push(TruckRoute {
                day,
                truck_id,
                stops,
                distance_km,
            });
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::engine::optimizer::solver::{BranchBoundSolver, MipSolver, SolveLimits};
    use std::time::Duration;

    fn visit(station_id: &str, delta: i64, lat: f64, lon: f64) -> DayVisit {
        DayVisit {
            station_id: station_id.to_string(),
            delta_bikes: delta,
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn test_single_truck_two_stops() {
        let mut config = PlannerConfig::default();
        config.fleet.fleet_size = 1;
        config.fleet.truck_capacity = 15;

        let visits = vec![
            visit("S001", 6, 48.85, 2.35),
            visit("S002", -6, 48.86, 2.36),
        ];
        let builder = RouteModelBuilder::new(&config);
        let route_model = builder.build(&visits);
        let solution = BranchBoundSolver
            .solve(
                &route_model.model,
                &SolveLimits::new(Duration::from_secs(10), 0.0),
            )
            .unwrap();
        assert!(solution.status.has_solution());

        let routes = builder.decode(&visits, &route_model, &solution, 2);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stops.len(), 2);

        // 路线任一时刻的累计载量不超过卡车容量
        let mut load = routes[0]
            .stops
            .iter()
            .map(|s| s.delta_bikes.max(0))
            .sum::<i64>();
        assert!(load <= config.fleet.truck_capacity as i64);
        for stop in &routes[0].stops {
            load -= stop.delta_bikes;
            assert!(load >= 0 && load <= config.fleet.truck_capacity as i64);
        }
    }

    #[test]
    fn test_fleet_limit_infeasible_when_overloaded() {
        // 1 辆载量 10 的卡车, 两个补车站各需 8 辆 → 无法一趟完成
        let mut config = PlannerConfig::default();
        config.fleet.fleet_size = 1;
        config.fleet.truck_capacity = 10;

        let visits = vec![
            visit("S001", 8, 48.85, 2.35),
            visit("S002", 8, 48.90, 2.40),
        ];
        let builder = RouteModelBuilder::new(&config);
        let route_model = builder.build(&visits);
        let solution = BranchBoundSolver
            .solve(
                &route_model.model,
                &SolveLimits::new(Duration::from_secs(10), 0.0),
            )
            .unwrap();
        assert!(!solution.status.has_solution());
    }

    #[test]
    fn test_haversine_zero_distance() {
        assert!(haversine_km(48.85, 2.35, 48.85, 2.35).abs() < 1e-9);
    }
}
