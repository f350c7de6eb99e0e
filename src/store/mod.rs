// ==========================================
// 共享单车再平衡调度系统 - 时间序列存储层
// ==========================================
// 职责: 向算法核心提供清洗后的周库存观测与站点静态属性
// 说明: 数据清洗/重采样由上游协作方完成, 本层只做入库不变量校验
// 红线: 下游各阶段对本层数据只读
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::station::{Station, StockSeries, WeekGrid};

// ==========================================
// 存储层错误
// ==========================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("站点不存在: {0}")]
    MissingStation(String),

    #[error("站点 {station} 缺少参考周观测")]
    MissingReferenceWeek { station: String },

    #[error("库存越界 (站点 {station}, 桶 {bin}): 库存 {stock} 超出容量 {capacity}")]
    StockOutOfRange {
        station: String,
        bin: usize,
        stock: u32,
        capacity: u32,
    },

    #[error("序列长度错误 (站点 {station}): 期望 {expected}, 实际 {actual}")]
    LengthMismatch {
        station: String,
        expected: usize,
        actual: usize,
    },

    #[error("CSV 解析失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("字段解析失败 (行 {row}): {message}")]
    FieldParse { row: usize, message: String },
}

// ==========================================
// TimeSeriesStore - 存储接口
// ==========================================

/// 时间序列存储 (外部协作方接口)
///
/// 提供两个时域: 上一个完整周 (参考周) 与当前进行中的部分周。
pub trait TimeSeriesStore: Send + Sync {
    /// 全部站点静态属性 (含排除标记)
    fn stations(&self) -> &[Station];

    /// 周时间网格
    fn grid(&self) -> WeekGrid;

    /// 参考周观测序列
    fn reference_week(&self, station_id: &str) -> Result<&StockSeries, StoreError>;

    /// 当前部分周观测序列 (可缺失)
    fn current_week(&self, station_id: &str) -> Option<&StockSeries>;

    /// 未被排除的站点
    fn active_stations(&self) -> Vec<&Station> {
        self.stations().iter().filter(|s| !s.excluded).collect()
    }
}

// ==========================================
// InMemoryTimeSeriesStore - 内存实现
// ==========================================

/// 内存实现: 测试与批处理入口共用
pub struct InMemoryTimeSeriesStore {
    grid: WeekGrid,
    stations: Vec<Station>,
    reference: HashMap<String, StockSeries>,
    current: HashMap<String, StockSeries>,
}

impl InMemoryTimeSeriesStore {
    pub fn new(grid: WeekGrid) -> Self {
        Self {
            grid,
            stations: Vec::new(),
            reference: HashMap::new(),
            current: HashMap::new(),
        }
    }

    /// 注册站点并写入参考周序列 (入库时校验库存不变量)
    pub fn insert_station(
        &mut self,
        station: Station,
        reference: StockSeries,
    ) -> Result<(), StoreError> {
        Self::check_series(&station, &reference, self.grid.bins_per_week())?;
        self.reference
            .insert(station.station_id.clone(), reference);
        self.stations.push(station);
        Ok(())
    }

    /// 写入当前部分周序列 (长度可短于整周)
    pub fn insert_current_week(
        &mut self,
        station_id: &str,
        series: StockSeries,
    ) -> Result<(), StoreError> {
        let station = self
            .stations
            .iter()
            .find(|s| s.station_id == station_id)
            .ok_or_else(|| StoreError::MissingStation(station_id.to_string()))?;
        for (bin, &stock) in series.stocks.iter().enumerate() {
            if stock > station.capacity {
                return Err(StoreError::StockOutOfRange {
                    station: station_id.to_string(),
                    bin,
                    stock,
                    capacity: station.capacity,
                });
            }
        }
        self.current.insert(station_id.to_string(), series);
        Ok(())
    }

    fn check_series(
        station: &Station,
        series: &StockSeries,
        expected_len: usize,
    ) -> Result<(), StoreError> {
        if series.stocks.len() != expected_len {
            return Err(StoreError::LengthMismatch {
                station: station.station_id.clone(),
                expected: expected_len,
                actual: series.stocks.len(),
            });
        }
        for (bin, &stock) in series.stocks.iter().enumerate() {
            if stock > station.capacity {
                return Err(StoreError::StockOutOfRange {
                    station: station.station_id.clone(),
                    bin,
                    stock,
                    capacity: station.capacity,
                });
            }
        }
        Ok(())
    }

    /// 从上游处理阶段的 CLEAN CSV 加载参考周
    ///
    /// 期望列: station,time,stock,capacity[,latitude,longitude,excluded]
    /// 行按 (站点, 时间) 排序, 每站点恰好覆盖一个整周。
    pub fn from_clean_csv(path: &Path, grid: WeekGrid) -> Result<Self, StoreError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h == name);

        let idx_station = col("station").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 station 列".to_string(),
        })?;
        let idx_time = col("time").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 time 列".to_string(),
        })?;
        let idx_stock = col("stock").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 stock 列".to_string(),
        })?;
        let idx_capacity = col("capacity").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 capacity 列".to_string(),
        })?;
        let idx_lat = col("latitude");
        let idx_lon = col("longitude");
        let idx_excluded = col("excluded");

        // 按站点聚合行
        let mut per_station: HashMap<String, (Station, Vec<(NaiveDateTime, u32)>)> =
            HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (row_no, record) in reader.records().enumerate() {
            let record = record?;
            let row = row_no + 2; // 表头占第一行
            let parse_err = |message: String| StoreError::FieldParse { row, message };

            let station_id = record
                .get(idx_station)
                .ok_or_else(|| parse_err("station 为空".to_string()))?
                .to_string();
            let time: NaiveDateTime = record
                .get(idx_time)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| parse_err("time 解析失败".to_string()))?;
            let stock: u32 = record
                .get(idx_stock)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.round().max(0.0) as u32)
                .ok_or_else(|| parse_err("stock 解析失败".to_string()))?;
            let capacity: u32 = record
                .get(idx_capacity)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.round() as u32)
                .ok_or_else(|| parse_err("capacity 解析失败".to_string()))?;

            let entry = per_station.entry(station_id.clone()).or_insert_with(|| {
                order.push(station_id.clone());
                let mut station = Station::new(&station_id, capacity);
                if let (Some(i), Some(j)) = (idx_lat, idx_lon) {
                    let lat = record.get(i).and_then(|v| v.parse().ok()).unwrap_or(0.0);
                    let lon = record.get(j).and_then(|v| v.parse().ok()).unwrap_or(0.0);
                    station = station.with_coords(lat, lon);
                }
                if let Some(i) = idx_excluded {
                    station.excluded = record
                        .get(i)
                        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                        .unwrap_or(false);
                }
                (station, Vec::new())
            });
            entry.1.push((time, stock));
        }

        let mut store = Self::new(grid);
        for station_id in order {
            let (station, mut rows) = per_station
                .remove(&station_id)
                .ok_or_else(|| StoreError::MissingStation(station_id.clone()))?;
            rows.sort_by_key(|(t, _)| *t);
            let start_day: NaiveDate = rows
                .first()
                .map(|(t, _)| t.date())
                .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
            let stocks: Vec<u32> = rows.into_iter().map(|(_, s)| s).collect();
            if station.excluded {
                warn!(station = %station.station_id, "站点在黑名单中, 跳过入库");
                store.stations.push(station);
                continue;
            }
            store.insert_station(station, StockSeries::new(&station_id, start_day, stocks))?;
        }

        info!(
            stations = store.stations.len(),
            "CLEAN CSV 加载完成"
        );
        Ok(store)
    }

    /// 从 CLEAN CSV 加载当前部分周观测 (列格式同参考周, 长度可不足整周)
    ///
    /// 未注册或被排除的站点行直接跳过。
    pub fn load_current_csv(&mut self, path: &Path) -> Result<(), StoreError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h == name);

        let idx_station = col("station").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 station 列".to_string(),
        })?;
        let idx_time = col("time").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 time 列".to_string(),
        })?;
        let idx_stock = col("stock").ok_or_else(|| StoreError::FieldParse {
            row: 0,
            message: "缺少 stock 列".to_string(),
        })?;

        let mut per_station: HashMap<String, Vec<(NaiveDateTime, u32)>> = HashMap::new();
        for (row_no, record) in reader.records().enumerate() {
            let record = record?;
            let row = row_no + 2;
            let parse_err = |message: String| StoreError::FieldParse { row, message };

            let station_id = record
                .get(idx_station)
                .ok_or_else(|| parse_err("station 为空".to_string()))?
                .to_string();
            let time: NaiveDateTime = record
                .get(idx_time)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| parse_err("time 解析失败".to_string()))?;
            let stock: u32 = record
                .get(idx_stock)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.round().max(0.0) as u32)
                .ok_or_else(|| parse_err("stock 解析失败".to_string()))?;
            per_station.entry(station_id).or_default().push((time, stock));
        }

        let mut loaded = 0usize;
        for (station_id, mut rows) in per_station {
            let active = self
                .stations
                .iter()
                .any(|s| s.station_id == station_id && !s.excluded);
            if !active {
                warn!(station = %station_id, "当前周观测无对应活跃站点, 跳过");
                continue;
            }
            rows.sort_by_key(|(t, _)| *t);
            let start_day: NaiveDate = rows
                .first()
                .map(|(t, _)| t.date())
                .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
            let stocks: Vec<u32> = rows.into_iter().map(|(_, s)| s).collect();
            self.insert_current_week(&station_id, StockSeries::new(&station_id, start_day, stocks))?;
            loaded += 1;
        }

        info!(stations = loaded, "当前周 CSV 加载完成");
        Ok(())
    }
}

impl TimeSeriesStore for InMemoryTimeSeriesStore {
    fn stations(&self) -> &[Station] {
        &self.stations
    }

    fn grid(&self) -> WeekGrid {
        self.grid
    }

    fn reference_week(&self, station_id: &str) -> Result<&StockSeries, StoreError> {
        self.reference
            .get(station_id)
            .ok_or_else(|| StoreError::MissingReferenceWeek {
                station: station_id.to_string(),
            })
    }

    fn current_week(&self, station_id: &str) -> Option<&StockSeries> {
        self.current.get(station_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 17).unwrap()
    }

    #[test]
    fn test_insert_and_read_back() {
        let grid = WeekGrid::new(2);
        let mut store = InMemoryTimeSeriesStore::new(grid);
        let series = StockSeries::new("S001", monday(), vec![5; grid.bins_per_week()]);
        store
            .insert_station(Station::new("S001", 20), series)
            .unwrap();
        assert_eq!(store.stations().len(), 1);
        assert_eq!(
            store.reference_week("S001").unwrap().stocks.len(),
            grid.bins_per_week()
        );
        assert!(store.current_week("S001").is_none());
    }

    #[test]
    fn test_stock_over_capacity_rejected() {
        let grid = WeekGrid::new(2);
        let mut store = InMemoryTimeSeriesStore::new(grid);
        let mut stocks = vec![5; grid.bins_per_week()];
        stocks[3] = 25;
        let series = StockSeries::new("S001", monday(), stocks);
        let err = store
            .insert_station(Station::new("S001", 20), series)
            .unwrap_err();
        assert!(matches!(err, StoreError::StockOutOfRange { .. }));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let grid = WeekGrid::new(2);
        let mut store = InMemoryTimeSeriesStore::new(grid);
        let series = StockSeries::new("S001", monday(), vec![5; 3]);
        let err = store
            .insert_station(Station::new("S001", 20), series)
            .unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { .. }));
    }
}
