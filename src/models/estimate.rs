//! 估算结果模型
//!
//! 外部估算调用的返回是松散的动态 JSON，一律在边界处校验并转换为
//! 强类型的 [`Estimate`]；每条记录的最终落盘形态是 [`ResultRecord`]。

use crate::models::record::InputRecord;

/// 输出 TSV 的列（字段数校验以此为准）
pub const RESULT_COLUMNS: [&str; 14] = [
    "order_id",
    "title_origin",
    "category",
    "status",
    "volume",
    "packed_volume",
    "weight_kg",
    "width_cm",
    "depth_cm",
    "height_cm",
    "reason",
    "error",
    "chunk_id",
    "estimated_at",
];

/// `status` 列的取值
pub const STATUS_OK: &str = "ok";
pub const STATUS_FAILED: &str = "failed";

/// 一次成功估算的结构化结果
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    /// 估算体积，形如 "20x15x10"（单位 cm）
    pub volume: String,
    /// 打包后体积，形如 "22x17x12"
    pub packed_volume: String,
    /// 估算重量（kg）
    pub weight_kg: f64,
    /// 估算依据
    pub reason: String,
}

impl Estimate {
    /// 解析出宽/深/高三维（优先 packed_volume，回退 volume）
    ///
    /// 无法解析的维度字符串返回 (0, 0, 0)，不视为错误
    pub fn dimensions(&self) -> (f64, f64, f64) {
        let source = if self.packed_volume.is_empty() {
            &self.volume
        } else {
            &self.packed_volume
        };
        parse_volume_string(source)
    }
}

/// 解析 "20x15x10" 形式的体积字符串为 (宽, 深, 高)
///
/// 大小写不敏感、忽略空格；解析失败返回 (0, 0, 0)
pub fn parse_volume_string(value: &str) -> (f64, f64, f64) {
    if value.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let cleaned = value.to_lowercase().replace(' ', "");
    let parts: Vec<&str> = cleaned.split('x').collect();
    if parts.len() == 3 {
        if let (Ok(w), Ok(d), Ok(h)) = (
            parts[0].parse::<f64>(),
            parts[1].parse::<f64>(),
            parts[2].parse::<f64>(),
        ) {
            return (w, d, h);
        }
    }
    (0.0, 0.0, 0.0)
}

/// 一条输出记录（输出 TSV 的一行）
///
/// 不变量：合并后的结果集中每个 `order_id` 至多出现一次；
/// 失败的记录以 `status = failed` 保留在结果中，不会被静默丢弃。
#[derive(Clone, Debug)]
pub struct ResultRecord {
    pub order_id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub volume: String,
    pub packed_volume: String,
    pub weight_kg: f64,
    pub width_cm: f64,
    pub depth_cm: f64,
    pub height_cm: f64,
    pub reason: String,
    pub error: String,
    pub chunk_id: String,
    pub estimated_at: String,
}

impl ResultRecord {
    /// 由成功的估算构建输出记录
    pub fn success(record: &InputRecord, estimate: &Estimate, chunk_id: &str) -> Self {
        let (w, d, h) = estimate.dimensions();
        Self {
            order_id: record.order_id.clone(),
            title: record.title.clone(),
            category: record.category.clone(),
            status: STATUS_OK.to_string(),
            volume: estimate.volume.clone(),
            packed_volume: estimate.packed_volume.clone(),
            weight_kg: estimate.weight_kg,
            width_cm: w,
            depth_cm: d,
            height_cm: h,
            reason: estimate.reason.clone(),
            error: String::new(),
            chunk_id: chunk_id.to_string(),
            estimated_at: now_timestamp(),
        }
    }

    /// 由失败的估算构建输出记录（失败也要落盘，保证结果集完整）
    pub fn failure(record: &InputRecord, message: &str, chunk_id: &str) -> Self {
        Self {
            order_id: record.order_id.clone(),
            title: record.title.clone(),
            category: record.category.clone(),
            status: STATUS_FAILED.to_string(),
            volume: String::new(),
            packed_volume: String::new(),
            weight_kg: 0.0,
            width_cm: 0.0,
            depth_cm: 0.0,
            height_cm: 0.0,
            reason: String::new(),
            error: message.to_string(),
            chunk_id: chunk_id.to_string(),
            estimated_at: now_timestamp(),
        }
    }

    /// 转换为 TSV 行字段（顺序与 [`RESULT_COLUMNS`] 一致）
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.order_id.clone(),
            self.title.clone(),
            self.category.clone(),
            self.status.clone(),
            self.volume.clone(),
            self.packed_volume.clone(),
            self.weight_kg.to_string(),
            self.width_cm.to_string(),
            self.depth_cm.to_string(),
            self.height_cm.to_string(),
            self.reason.clone(),
            self.error.clone(),
            self.chunk_id.clone(),
            self.estimated_at.clone(),
        ]
    }
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume_string() {
        assert_eq!(parse_volume_string("20x15x10"), (20.0, 15.0, 10.0));
        assert_eq!(parse_volume_string("20 X 15 x 10.5"), (20.0, 15.0, 10.5));
        assert_eq!(parse_volume_string(""), (0.0, 0.0, 0.0));
        assert_eq!(parse_volume_string("大约20cm"), (0.0, 0.0, 0.0));
        assert_eq!(parse_volume_string("20x15"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_dimensions_prefers_packed_volume() {
        let estimate = Estimate {
            volume: "20x15x10".to_string(),
            packed_volume: "22x17x12".to_string(),
            weight_kg: 1.5,
            reason: "测试".to_string(),
        };
        assert_eq!(estimate.dimensions(), (22.0, 17.0, 12.0));
    }

    #[test]
    fn test_dimensions_falls_back_to_volume() {
        let estimate = Estimate {
            volume: "20x15x10".to_string(),
            packed_volume: String::new(),
            weight_kg: 1.5,
            reason: String::new(),
        };
        assert_eq!(estimate.dimensions(), (20.0, 15.0, 10.0));
    }

    #[test]
    fn test_result_record_row_matches_columns() {
        let record = InputRecord {
            order_id: "A-1".to_string(),
            title: "折叠收纳箱".to_string(),
            category: "收纳用品".to_string(),
            image_url: None,
        };
        let estimate = Estimate {
            volume: "20x15x10".to_string(),
            packed_volume: String::new(),
            weight_kg: 1.2,
            reason: "按同类商品估算".to_string(),
        };

        let ok = ResultRecord::success(&record, &estimate, "0001");
        assert_eq!(ok.to_row().len(), RESULT_COLUMNS.len());
        assert_eq!(ok.status, STATUS_OK);
        assert_eq!(ok.width_cm, 20.0);

        let failed = ResultRecord::failure(&record, "调用超时", "0001");
        assert_eq!(failed.to_row().len(), RESULT_COLUMNS.len());
        assert_eq!(failed.status, STATUS_FAILED);
        assert_eq!(failed.error, "调用超时");
    }
}
