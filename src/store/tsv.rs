//! TSV 读写
//!
//! 记录数据沿用源数据集的 TSV 格式（带表头、制表符分隔）。
//! 写入侧对字段做消毒（制表符/换行替换为空格），因此解析侧可以
//! 安全地按制表符切分；输出文件的崩溃安全性依赖逐条刷盘
//! （`flush` + `sync_data`），完整性校验依赖字段数比对。

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult, InputError};

/// 清洗字段：TSV 中不允许出现制表符和换行
pub fn sanitize_field(value: &str) -> String {
    value
        .replace(['\t', '\r', '\n'], " ")
        .trim()
        .to_string()
}

/// 将字段拼成一行（不含换行符）
pub fn format_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| sanitize_field(f))
        .collect::<Vec<_>>()
        .join("\t")
}

/// 按制表符切分一行
pub fn split_row(line: &str) -> Vec<String> {
    line.split('\t').map(|s| s.to_string()).collect()
}

/// 读取整个 TSV 表（表头 + 数据行，跳过空行，不做字段数校验）
pub fn read_table(path: &Path) -> AppResult<(Vec<String>, Vec<Vec<String>>)> {
    if !path.exists() {
        return Err(InputError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let file = File::open(path)
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
    let reader = BufReader::new(file);

    let mut header = Vec::new();
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        if line.is_empty() {
            continue;
        }
        if idx == 0 {
            header = split_row(&line);
        } else {
            rows.push(split_row(&line));
        }
    }
    Ok((header, rows))
}

/// 带字段数校验的表扫描结果
#[derive(Debug)]
pub struct TableScan {
    pub header: Vec<String>,
    /// 字段数正确的行
    pub rows: Vec<Vec<String>>,
    /// 被丢弃的损坏行: (行号, 实际字段数)。行号 1 起始，含表头行计数
    pub discarded: Vec<(usize, usize)>,
}

/// 读取 TSV 表并丢弃字段数不符的行
///
/// 半写的尾行、被截断的行都会落入 `discarded`；
/// 调用方决定如何记录日志，该函数本身不视损坏行为错误。
pub fn read_table_validated(path: &Path, expected_fields: usize) -> AppResult<TableScan> {
    let file = File::open(path)
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
    let reader = BufReader::new(file);

    let mut scan = TableScan {
        header: Vec::new(),
        rows: Vec::new(),
        discarded: Vec::new(),
    };
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        if line.is_empty() {
            continue;
        }
        let fields = split_row(&line);
        if idx == 0 {
            scan.header = fields;
            continue;
        }
        // 字段数必须严格一致：截断与超长同样不可信
        if fields.len() == expected_fields {
            scan.rows.push(fields);
        } else {
            scan.discarded.push((idx + 1, fields.len()));
        }
    }
    Ok(scan)
}

/// 原子写整表：先写临时文件再 rename
pub fn write_table_atomic(
    path: &Path,
    header: &[String],
    rows: &[Vec<String>],
) -> AppResult<()> {
    let tmp = tmp_path(path);
    let mut content = String::new();
    content.push_str(&format_row(header));
    content.push('\n');
    for row in rows {
        content.push_str(&format_row(row));
        content.push('\n');
    }
    std::fs::write(&tmp, content)
        .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 逐条追加 + 强制刷盘的 TSV 写入器
///
/// 每条记录写入后立即 `flush` + `sync_data`：中断时未刷盘的记录
/// 直接不存在于文件中，续跑时会被重新处理，绝不会出现
/// "内存里算过但盘上没有" 被误判为已完成的情况。
pub struct TsvAppender {
    file: File,
    path: PathBuf,
}

impl TsvAppender {
    /// 新建输出文件（截断已有内容）并写入表头
    pub fn create(path: &Path, header: &[String]) -> AppResult<Self> {
        let file = File::create(path)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        let mut appender = Self {
            file,
            path: path.to_path_buf(),
        };
        appender.write_line(&format_row(header))?;
        Ok(appender)
    }

    /// 以追加方式打开已有输出文件（表头已存在）
    pub fn open_append(path: &Path) -> AppResult<Self> {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// 追加一行并强制刷盘
    pub fn append_row(&mut self, fields: &[String]) -> AppResult<()> {
        self.write_line(&format_row(fields))
    }

    fn write_line(&mut self, line: &str) -> AppResult<()> {
        let to_err = |e: std::io::Error| {
            AppError::file_write_failed(self.path.display().to_string(), e)
        };
        self.file.write_all(line.as_bytes()).map_err(to_err)?;
        self.file.write_all(b"\n").map_err(to_err)?;
        self.file.flush().map_err(to_err)?;
        self.file.sync_data().map_err(to_err)?;
        Ok(())
    }

    /// 完成写入：全量落盘后关闭文件
    pub fn finish(self) -> AppResult<()> {
        self.file
            .sync_all()
            .map_err(|e| AppError::file_write_failed(self.path.display().to_string(), e))?;
        Ok(())
    }
}
