// ==========================================
// 共享单车再平衡调度系统 - 前沿提取引擎
// ==========================================
// 职责: 将每站点的完整策略表压缩为 (cost, -score) 非支配子集
// 规则: 成本升序扫描, 仅保留得分严格提升者;
//       成本得分双双并列时保留枚举序号最小者 (可复现)
// ==========================================

use std::path::Path;

use tracing::{debug, info};

use crate::config::CorridorConfig;
use crate::domain::strategy::{EvaluatedStrategy, ParetoSet};
use crate::engine::evaluation::StationEvaluation;

/// 导出前沿成员 CSV (诊断产物)
pub fn write_frontier_csv(sets: &[ParetoSet], path: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "station",
        "autopass",
        "strategy_index",
        "direction",
        "pattern",
        "quantity",
        "score",
        "cost",
    ])?;
    for set in sets {
        for member in &set.members {
            writer.write_record([
                set.station_id.clone(),
                set.autopass.to_string(),
                member.strategy_index.to_string(),
                member.strategy.direction.as_str().to_string(),
                member.strategy.pattern_string(),
                member.strategy.quantity.to_string(),
                format!("{:.6}", member.score),
                format!("{:.2}", member.cost),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

// ==========================================
// FrontierExtractor - 前沿提取引擎
// ==========================================

pub struct FrontierExtractor {
    corridor: CorridorConfig,
}

impl FrontierExtractor {
    pub fn new(corridor: CorridorConfig) -> Self {
        Self { corridor }
    }

    /// 提取全网帕累托前沿
    ///
    /// # 返回
    /// 每站点一个 ParetoSet; 无任何可用策略的站点被整体剔除
    /// (评估退化, 附告警但不阻塞)
    pub fn extract(&self, evaluations: &[StationEvaluation]) -> Vec<ParetoSet> {
        let mut sets = Vec::new();
        for evaluation in evaluations {
            if let Some(set) = self.extract_station(evaluation) {
                sets.push(set);
            }
        }
        let autopass = sets.iter().filter(|s| s.autopass).count();
        info!(
            stations = sets.len(),
            autopass, "前沿提取完成"
        );
        sets
    }

    /// 单站点的支配扫描
    fn extract_station(&self, evaluation: &StationEvaluation) -> Option<ParetoSet> {
        // 可用策略: 落地可行 且 周占用率包络触及服务走廊
        let good = |s: &EvaluatedStrategy| -> bool {
            s.applyable
                && s.max_ratio >= self.corridor.empty_ratio
                && s.min_ratio <= self.corridor.full_ratio
        };

        let baseline = evaluation
            .strategies
            .iter()
            .find(|s| s.strategy.is_baseline())?;

        // 基准已达标: 无需出车 (autopass), 前沿只保留基准作为参照
        if good(baseline) {
            debug!(station = %evaluation.station_id, "基准策略已达标 (autopass)");
            return Some(ParetoSet {
                station_id: evaluation.station_id.clone(),
                members: vec![baseline.clone()],
                autopass: true,
            });
        }

        let mut candidates: Vec<&EvaluatedStrategy> =
            evaluation.strategies.iter().filter(|s| good(s)).collect();
        if candidates.is_empty() {
            // 评估退化: 该站点没有任何可行策略
            return None;
        }

        // 成本升序; 同成本按得分降序; 双双并列按枚举序号
        candidates.sort_by(|a, b| {
            a.cost
                .partial_cmp(&b.cost)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.strategy_index.cmp(&b.strategy_index))
        });

        let mut members = Vec::new();
        let mut best_score = f64::NEG_INFINITY;
        for candidate in candidates {
            if candidate.score > best_score {
                best_score = candidate.score;
                members.push(candidate.clone());
            }
        }

        Some(ParetoSet {
            station_id: evaluation.station_id.clone(),
            members,
            autopass: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::Strategy;
    use crate::domain::types::RegulationDirection;

    fn make(
        index: usize,
        score: f64,
        cost: f64,
        applyable: bool,
        baseline: bool,
    ) -> EvaluatedStrategy {
        let strategy = if baseline {
            Strategy::baseline(7)
        } else {
            Strategy::new(
                RegulationDirection::Refill,
                vec![true, false, false, false, false, false, false],
                15,
            )
        };
        EvaluatedStrategy {
            station_id: "S001".to_string(),
            strategy_index: index,
            strategy,
            score,
            cost,
            applyable,
            // 包络默认触及走廊 (good)
            min_ratio: 0.3,
            max_ratio: 0.5,
            unmet_demand: 0.0,
        }
    }

    fn extractor() -> FrontierExtractor {
        FrontierExtractor::new(CorridorConfig::default())
    }

    fn evaluation(strategies: Vec<EvaluatedStrategy>) -> StationEvaluation {
        StationEvaluation {
            station_id: "S001".to_string(),
            capacity: 20,
            strategies,
        }
    }

    #[test]
    fn test_autopass_keeps_baseline_only() {
        let set = extractor()
            .extract_station(&evaluation(vec![
                make(0, 0.9, 0.0, true, true),
                make(1, 1.0, 16.0, true, false),
            ]))
            .unwrap();
        assert!(set.autopass);
        assert_eq!(set.members.len(), 1);
        assert!(set.members[0].strategy.is_baseline());
    }

    #[test]
    fn test_dominated_strategy_removed() {
        // 基准不达标 (包络在走廊之下)
        let mut baseline = make(0, 0.0, 0.0, true, true);
        baseline.min_ratio = 0.0;
        baseline.max_ratio = 0.1;
        let cheap_good = make(1, 0.8, 16.0, true, false);
        let pricey_bad = make(2, 0.6, 32.0, true, false); // 更贵且更差 → 被支配
        let pricey_good = make(3, 0.95, 32.0, true, false);

        let set = extractor()
            .extract_station(&evaluation(vec![
                baseline,
                cheap_good,
                pricey_bad,
                pricey_good,
            ]))
            .unwrap();
        let indices: Vec<usize> = set.members.iter().map(|m| m.strategy_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_tie_keeps_lowest_index() {
        let mut baseline = make(0, 0.0, 0.0, true, true);
        baseline.max_ratio = 0.1;
        let first = make(1, 0.8, 16.0, true, false);
        let duplicate = make(2, 0.8, 16.0, true, false);

        let set = extractor()
            .extract_station(&evaluation(vec![baseline, first, duplicate]))
            .unwrap();
        assert_eq!(set.members.len(), 1);
        assert_eq!(set.members[0].strategy_index, 1);
    }

    #[test]
    fn test_no_good_strategy_drops_station() {
        let mut baseline = make(0, 0.0, 0.0, true, true);
        baseline.max_ratio = 0.1;
        let mut bad = make(1, 0.5, 16.0, false, false);
        bad.max_ratio = 0.1;
        assert!(extractor()
            .extract_station(&evaluation(vec![baseline, bad]))
            .is_none());
    }

    #[test]
    fn test_mutual_non_domination() {
        let mut baseline = make(0, 0.0, 0.0, true, true);
        baseline.max_ratio = 0.1;
        let strategies = vec![
            baseline,
            make(1, 0.5, 16.0, true, false),
            make(2, 0.7, 17.0, true, false),
            make(3, 0.6, 18.0, true, false),
            make(4, 0.9, 33.0, true, false),
        ];
        let set = extractor().extract_station(&evaluation(strategies)).unwrap();
        for a in &set.members {
            for b in &set.members {
                if a.strategy_index == b.strategy_index {
                    continue;
                }
                let dominates = a.cost <= b.cost
                    && a.score >= b.score
                    && (a.cost < b.cost || a.score > b.score);
                assert!(!dominates, "前沿内部存在支配对");
            }
        }
    }
}
