// ==========================================
// 共享单车再平衡调度系统 - 站点与库存序列
// ==========================================
// 职责: 站点静态属性 + 周粒度库存观测序列
// 不变量: 0 <= stock <= capacity (由 store 层入库时校验)
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 一周天数 (规划周期固定为整周)
pub const DAYS_PER_WEEK: usize = 7;

// ==========================================
// Station - 站点静态属性
// ==========================================

/// 站点主数据 (规划周期内不可变)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub station_id: String,    // 站点编码
    pub capacity: u32,         // 桩位数 (车辆容量上限)
    pub excluded: bool,        // 黑名单/排除标记
    pub latitude: f64,         // 纬度 (路径距离计算)
    pub longitude: f64,        // 经度
}

impl Station {
    pub fn new(station_id: &str, capacity: u32) -> Self {
        Self {
            station_id: station_id.to_string(),
            capacity,
            excluded: false,
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    pub fn with_coords(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }
}

// ==========================================
// WeekGrid - 周时间网格
// ==========================================

/// 固定粒度的周时间网格 (例如 20 分钟粒度 → 每天 72 个时间桶)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekGrid {
    pub bins_per_day: usize,
}

impl WeekGrid {
    pub fn new(bins_per_day: usize) -> Self {
        Self { bins_per_day }
    }

    /// 默认 20 分钟粒度
    pub fn twenty_minutes() -> Self {
        Self { bins_per_day: 72 }
    }

    /// 一周总桶数
    pub fn bins_per_week(&self) -> usize {
        DAYS_PER_WEEK * self.bins_per_day
    }

    /// 每小时桶数 (要求 bins_per_day 可被 24 整除)
    pub fn bins_per_hour(&self) -> usize {
        self.bins_per_day / 24
    }

    /// 小时 → 当日桶下标
    pub fn hour_to_bin(&self, hour: u32) -> usize {
        (hour as usize * self.bins_per_hour()).min(self.bins_per_day - 1)
    }

    /// (天, 当日桶) → 周内线性下标
    pub fn linear_index(&self, day: usize, bin: usize) -> usize {
        day * self.bins_per_day + bin
    }
}

// ==========================================
// StockSeries - 库存观测序列
// ==========================================

/// 单站点一周的库存观测 (只读, 由时间序列存储层提供)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSeries {
    pub station_id: String,    // 站点编码
    pub start_day: NaiveDate,  // 周起始日
    pub stocks: Vec<u32>,      // 每桶观测库存, 长度 = 周总桶数 (部分周可更短)
}

impl StockSeries {
    pub fn new(station_id: &str, start_day: NaiveDate, stocks: Vec<u32>) -> Self {
        Self {
            station_id: station_id.to_string(),
            start_day,
            stocks,
        }
    }

    /// 指定 (天, 桶) 的观测库存
    pub fn stock_at(&self, grid: &WeekGrid, day: usize, bin: usize) -> Option<u32> {
        self.stocks.get(grid.linear_index(day, bin)).copied()
    }

    /// 序列末尾观测 (当前周起始库存的来源)
    pub fn last_stock(&self) -> Option<u32> {
        self.stocks.last().copied()
    }
}
