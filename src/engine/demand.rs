// ==========================================
// 共享单车再平衡调度系统 - 需求重构引擎
// ==========================================
// 职责: 从受容量删失的库存观测中反演潜在净需求
// 算法: (站点 × 天 × 时间桶) 三模态低秩分解 (Tucker/HOOI)
//       + EM 式删失桶插补循环
// 不变量: 非删失桶输出等于观测净流量
// ==========================================

use nalgebra::DMatrix;
use ndarray::{Array2, Array3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ReconstructionConfig;
use crate::domain::demand::{LatentDemand, ReconstructionDiagnostics};
use crate::domain::station::{Station, WeekGrid, DAYS_PER_WEEK};
use crate::engine::error::PlanningError;
use crate::store::TimeSeriesStore;

/// 边界桶上轻微为负的重构需求直接归零的幅值阈值
const NEG_CLAMP_EPS: f64 = 0.05;

// ==========================================
// 张量工具
// ==========================================

/// 按模态展开张量为矩阵 (mode 维在行, 其余维按行主序展开在列)
fn unfold(x: &Array3<f64>, mode: usize) -> Array2<f64> {
    let (a, b, c) = x.dim();
    match mode {
        0 => {
            let mut m = Array2::zeros((a, b * c));
            for ((i, j, k), &v) in x.indexed_iter() {
                m[[i, j * c + k]] = v;
            }
            m
        }
        1 => {
            let mut m = Array2::zeros((b, a * c));
            for ((i, j, k), &v) in x.indexed_iter() {
                m[[j, i * c + k]] = v;
            }
            m
        }
        _ => {
            let mut m = Array2::zeros((c, a * b));
            for ((i, j, k), &v) in x.indexed_iter() {
                m[[k, i * b + j]] = v;
            }
            m
        }
    }
}

/// unfold 的逆操作
fn fold(m: &Array2<f64>, mode: usize, dims: (usize, usize, usize)) -> Array3<f64> {
    let (_, b, c) = dims;
    let mut x = Array3::zeros(dims);
    match mode {
        0 => {
            for ((i, col), &v) in m.indexed_iter() {
                x[[i, col / c, col % c]] = v;
            }
        }
        1 => {
            for ((j, col), &v) in m.indexed_iter() {
                x[[col / c, j, col % c]] = v;
            }
        }
        _ => {
            for ((k, col), &v) in m.indexed_iter() {
                x[[col / b, col % b, k]] = v;
            }
        }
    }
    x
}

/// 模态积: 用矩阵 u (k × dim_mode) 替换张量的 mode 维
fn mode_product(x: &Array3<f64>, u: &Array2<f64>, mode: usize) -> Array3<f64> {
    let (a, b, c) = x.dim();
    let unfolded = unfold(x, mode);
    let product = u.dot(&unfolded);
    let new_dims = match mode {
        0 => (u.nrows(), b, c),
        1 => (a, u.nrows(), c),
        _ => (a, b, u.nrows()),
    };
    fold(&product, mode, new_dims)
}

/// 模态展开矩阵的前 rank 个左奇异向量 (dim × rank)
fn leading_left_singular_vectors(m: &Array2<f64>, rank: usize) -> Array2<f64> {
    let (rows, cols) = m.dim();
    let rank = rank.min(rows).min(cols).max(1);

    let na = DMatrix::from_fn(rows, cols, |i, j| m[[i, j]]);
    let svd = na.svd(true, false);
    let u = match svd.u {
        Some(u) => u,
        // SVD 不收敛在实数稠密矩阵上不应出现, 退化为单位投影
        None => return Array2::eye(rows),
    };

    // nalgebra 不保证奇异值排序, 手动按降序取列
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| {
        svd.singular_values[j]
            .partial_cmp(&svd.singular_values[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = Array2::zeros((rows, rank));
    for (col, &src) in order.iter().take(rank).enumerate() {
        for row in 0..rows {
            out[[row, col]] = u[(row, src)];
        }
    }
    out
}

/// 当前张量的三模态低秩投影 (HOSVD 截断)
fn low_rank_projection(x: &Array3<f64>, ranks: (usize, usize, usize)) -> Array3<f64> {
    let factors = [
        leading_left_singular_vectors(&unfold(x, 0), ranks.0),
        leading_left_singular_vectors(&unfold(x, 1), ranks.1),
        leading_left_singular_vectors(&unfold(x, 2), ranks.2),
    ];

    let mut y = x.clone();
    for (mode, u) in factors.iter().enumerate() {
        // 投影矩阵 u * uᵀ (dim × dim)
        let projector = u.dot(&u.t());
        y = mode_product(&y, &projector, mode);
    }
    y
}

fn frobenius(x: &Array3<f64>) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

// ==========================================
// reconstruct_tensor - 纯函数核心
// ==========================================

/// 删失感知的低秩张量重构 (无副作用, 便于对合成数据测试)
///
/// # 参数
/// - observed: 观测净流量张量 (删失桶的值会被忽略)
/// - censored: 删失掩码, true 表示该桶的真实需求被容量边界遮蔽
/// - ranks: Tucker 三模态秩
/// - max_iterations: 迭代预算
/// - tolerance: 相对 Frobenius 变化的收敛容差
///
/// # 返回
/// (重构张量, 实际迭代次数, 末次残差)。非删失桶恒等于观测值。
/// 未收敛不视为失败, 调用方可用迭代数与残差评估置信度。
pub fn reconstruct_tensor(
    observed: &Array3<f64>,
    censored: &Array3<bool>,
    ranks: (usize, usize, usize),
    max_iterations: usize,
    tolerance: f64,
) -> (Array3<f64>, usize, f64) {
    let n_censored = censored.iter().filter(|&&c| c).count();

    // 完全无删失: 观测即答案, 单趟收敛
    if n_censored == 0 {
        return (observed.clone(), 1, 0.0);
    }

    // 初值: 删失桶置零
    let mut x = observed.clone();
    for (idx, &is_censored) in censored.indexed_iter() {
        if is_censored {
            x[idx] = 0.0;
        }
    }

    let mut iterations = 0;
    let mut residual = f64::INFINITY;

    for it in 1..=max_iterations {
        iterations = it;
        let prediction = low_rank_projection(&x, ranks);

        // E 步: 删失桶取低秩预测, 非删失桶回写观测
        let mut x_next = observed.clone();
        for (idx, &is_censored) in censored.indexed_iter() {
            if is_censored {
                x_next[idx] = prediction[idx];
            }
        }

        let delta = &x_next - &x;
        residual = frobenius(&delta) / (frobenius(&x) + 1e-12);
        x = x_next;

        if residual < tolerance {
            break;
        }
    }

    (x, iterations, residual)
}

// ==========================================
// DemandReconstructor - 需求重构引擎
// ==========================================

pub struct DemandReconstructor {
    config: ReconstructionConfig,
}

/// 单站点的观测装配结果
struct StationTensor {
    observed: Vec<f64>,
    censored: Vec<bool>,
    has_interior: bool,
}

impl DemandReconstructor {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    /// 对参考周执行需求重构
    ///
    /// # 返回
    /// 每站点每时间桶的潜在净需求, 附收敛诊断与低置信度站点注解
    pub fn reconstruct(
        &self,
        store: &dyn TimeSeriesStore,
    ) -> Result<LatentDemand, PlanningError> {
        let stations = store.active_stations();
        if stations.is_empty() {
            return Err(PlanningError::EmptyNetwork);
        }
        let grid = store.grid();
        let bins_per_day = grid.bins_per_day;
        let n_stations = stations.len();

        info!(stations = n_stations, "开始需求重构");

        // 各站点独立装配, rayon 并行
        let assembled: Result<Vec<StationTensor>, PlanningError> = stations
            .par_iter()
            .map(|station| {
                let series = store.reference_week(&station.station_id)?;
                Ok(self.assemble_station(station, &series.stocks, grid))
            })
            .collect();
        let assembled = assembled?;

        let mut observed = Array3::zeros((n_stations, DAYS_PER_WEEK, bins_per_day));
        let mut censored = Array3::from_elem((n_stations, DAYS_PER_WEEK, bins_per_day), false);
        let mut low_confidence = Vec::new();

        for (s, tensor) in assembled.iter().enumerate() {
            for day in 0..DAYS_PER_WEEK {
                for bin in 0..bins_per_day {
                    let lin = grid.linear_index(day, bin);
                    observed[[s, day, bin]] = tensor.observed[lin];
                    censored[[s, day, bin]] = tensor.censored[lin];
                }
            }
            if !tensor.has_interior {
                warn!(
                    station = %stations[s].station_id,
                    "整周无内点观测, 仅全局低秩预测, 标记为低置信度"
                );
                low_confidence.push(stations[s].station_id.clone());
            }
        }

        let censored_cells = censored.iter().filter(|&&c| c).count();
        let (mut demand, iterations, residual) = reconstruct_tensor(
            &observed,
            &censored,
            self.config.ranks,
            self.config.max_iterations,
            self.config.tolerance,
        );
        let converged = residual < self.config.tolerance;
        if !converged {
            warn!(
                iterations,
                residual, "需求重构未在迭代预算内收敛, 返回当前最优估计"
            );
        }

        // 仅后处理插补桶: 幅值截断 + 边界上轻微为负的估计归零;
        // 非删失桶原样保留观测净流量
        for (idx, &is_censored) in censored.indexed_iter() {
            if !is_censored {
                continue;
            }
            let clipped = demand[idx].clamp(-self.config.demand_clip, self.config.demand_clip);
            demand[idx] = if clipped < 0.0 && clipped > -NEG_CLAMP_EPS {
                0.0
            } else {
                clipped
            };
        }

        debug!(iterations, residual, censored_cells, "需求重构完成");

        Ok(LatentDemand {
            grid,
            station_ids: stations
                .iter()
                .map(|s| s.station_id.clone())
                .collect(),
            demand,
            diagnostics: ReconstructionDiagnostics {
                iterations,
                residual,
                converged,
                censored_cells,
                low_confidence_stations: low_confidence,
            },
        })
    }

    /// 装配单站点的净流量与删失掩码
    ///
    /// 删失定义: 本桶或上一桶的库存贴着 0 或容量边界 (含配置余量),
    /// 此时观测到的流量可能小于真实需求。
    fn assemble_station(
        &self,
        station: &Station,
        stocks: &[u32],
        grid: WeekGrid,
    ) -> StationTensor {
        let total = grid.bins_per_week();
        let mut observed = vec![0.0; total];
        let mut censored = vec![false; total];

        let at_boundary = |stock: u32| -> bool {
            stock <= self.config.censor_empty_margin
                || station.capacity.saturating_sub(stock) <= self.config.censor_full_margin
        };

        for lin in 0..total.min(stocks.len()) {
            if lin == 0 {
                // 首桶无前驱, 净流量按 0 记
                observed[lin] = 0.0;
                censored[lin] = false;
                continue;
            }
            observed[lin] = stocks[lin] as f64 - stocks[lin - 1] as f64;
            censored[lin] = at_boundary(stocks[lin]) || at_boundary(stocks[lin - 1]);
        }

        let has_interior = censored.iter().skip(1).any(|&c| !c);
        StationTensor {
            observed,
            censored,
            has_interior,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfold_fold_roundtrip() {
        let x = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f64);
        for mode in 0..3 {
            let m = unfold(&x, mode);
            let back = fold(&m, mode, x.dim());
            assert_eq!(back, x);
        }
    }

    #[test]
    fn test_uncensored_input_is_fixed_point() {
        let x = Array3::from_shape_fn((3, 7, 6), |(i, j, k)| {
            ((i + 1) as f64) * ((j as f64) * 0.5).sin() + (k as f64) * 0.1
        });
        let censored = Array3::from_elem(x.dim(), false);
        let (rec, iterations, residual) = reconstruct_tensor(&x, &censored, (2, 2, 2), 10, 1e-6);
        assert_eq!(iterations, 1);
        assert!(residual.abs() < 1e-12);
        assert_eq!(rec, x);
    }

    #[test]
    fn test_censored_cells_take_low_rank_prediction() {
        // 秩 1 张量: a_i * b_j * c_k, 删失一个桶后应被准确恢复
        let a = [1.0, 2.0, 3.0];
        let b = [0.5, 1.0, 1.5, 2.0, 1.0, 0.5, 0.3];
        let c = [1.0, -1.0, 2.0, 0.5];
        let x = Array3::from_shape_fn((3, 7, 4), |(i, j, k)| a[i] * b[j] * c[k]);

        let mut censored = Array3::from_elem(x.dim(), false);
        censored[[1, 2, 3]] = true;

        let (rec, _, _) = reconstruct_tensor(&x, &censored, (1, 1, 1), 50, 1e-9);
        // 非删失桶严格等于观测
        assert_eq!(rec[[0, 0, 0]], x[[0, 0, 0]]);
        // 删失桶接近真实秩 1 值
        assert!((rec[[1, 2, 3]] - x[[1, 2, 3]]).abs() < 0.05);
    }
}
