//! 输入记录模型
//!
//! 一条输入记录对应一次估算调用。输入文件为带表头的 TSV，
//! 必需列: `order_id`、`title_origin`（可回退 `title_target`）、`category`；
//! 可选列: `thumbnail_urls`（`|` 分隔，取第一个作为估算图片）。

use crate::error::InputError;

/// 输入记录：一个待估算的商品
#[derive(Clone, Debug, PartialEq)]
pub struct InputRecord {
    /// 唯一标识（去重与断点续跑的依据）
    pub order_id: String,
    /// 商品标题
    pub title: String,
    /// 商品类目
    pub category: String,
    /// 估算用图片 URL（可选）
    pub image_url: Option<String>,
}

/// 输入表头中必需列的下标
#[derive(Clone, Copy, Debug)]
pub struct InputColumns {
    pub order_id: usize,
    pub title: usize,
    pub category: usize,
    pub thumbnails: Option<usize>,
}

impl InputColumns {
    /// 在表头中定位必需列
    ///
    /// # 返回
    /// 缺少必需列时返回 `InputError::MissingColumn`
    pub fn resolve(header: &[String], path: &str) -> Result<Self, InputError> {
        let find = |name: &str| header.iter().position(|h| h == name);

        let order_id = find("order_id").ok_or_else(|| InputError::MissingColumn {
            path: path.to_string(),
            column: "order_id".to_string(),
        })?;
        // 标题列允许两种命名（源数据集存在两个版本）
        let title = find("title_origin")
            .or_else(|| find("title_target"))
            .ok_or_else(|| InputError::MissingColumn {
                path: path.to_string(),
                column: "title_origin".to_string(),
            })?;
        let category = find("category").ok_or_else(|| InputError::MissingColumn {
            path: path.to_string(),
            column: "category".to_string(),
        })?;

        Ok(Self {
            order_id,
            title,
            category,
            thumbnails: find("thumbnail_urls"),
        })
    }

    /// 从一行 TSV 字段构建输入记录
    ///
    /// 下标越界的字段按空值处理（行校验由上层的字段数检查负责）
    pub fn record_from_row(&self, row: &[String]) -> InputRecord {
        let get = |idx: usize| row.get(idx).cloned().unwrap_or_default();

        let image_url = self.thumbnails.and_then(|idx| {
            let urls = get(idx);
            let first = urls.split('|').next().unwrap_or("").trim().to_string();
            if first.is_empty() {
                None
            } else {
                Some(first)
            }
        });

        InputRecord {
            order_id: get(self.order_id),
            title: get(self.title),
            category: get(self.category),
            image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_required_columns() {
        let h = header(&["order_id", "title_origin", "category", "thumbnail_urls"]);
        let cols = InputColumns::resolve(&h, "input.tsv").unwrap();
        assert_eq!(cols.order_id, 0);
        assert_eq!(cols.title, 1);
        assert_eq!(cols.category, 2);
        assert_eq!(cols.thumbnails, Some(3));
    }

    #[test]
    fn test_resolve_title_fallback() {
        let h = header(&["category", "order_id", "title_target"]);
        let cols = InputColumns::resolve(&h, "input.tsv").unwrap();
        assert_eq!(cols.title, 2);
        assert!(cols.thumbnails.is_none());
    }

    #[test]
    fn test_resolve_missing_column() {
        let h = header(&["order_id", "title_origin"]);
        let err = InputColumns::resolve(&h, "input.tsv").unwrap_err();
        assert!(matches!(err, InputError::MissingColumn { column, .. } if column == "category"));
    }

    #[test]
    fn test_record_from_row_takes_first_thumbnail() {
        let h = header(&["order_id", "title_origin", "category", "thumbnail_urls"]);
        let cols = InputColumns::resolve(&h, "input.tsv").unwrap();
        let row: Vec<String> = vec![
            "A-1".into(),
            "折叠收纳箱".into(),
            "收纳用品".into(),
            "https://img.example.com/a.jpg|https://img.example.com/b.jpg".into(),
        ];
        let record = cols.record_from_row(&row);
        assert_eq!(record.order_id, "A-1");
        assert_eq!(
            record.image_url.as_deref(),
            Some("https://img.example.com/a.jpg")
        );
    }

    #[test]
    fn test_record_from_row_empty_thumbnail_is_none() {
        let h = header(&["order_id", "title_origin", "category", "thumbnail_urls"]);
        let cols = InputColumns::resolve(&h, "input.tsv").unwrap();
        let row: Vec<String> = vec!["A-1".into(), "标题".into(), "类目".into(), "".into()];
        assert!(cols.record_from_row(&row).image_url.is_none());
    }
}
