use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 输入数据集错误
    Input(InputError),
    /// 估算调用错误
    Call(CallError),
    /// 任务（Job）级错误
    Job(JobError),
    /// Worker 进程错误
    Worker(WorkerError),
    /// 文件操作错误
    File(FileError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Input(e) => write!(f, "输入错误: {}", e),
            AppError::Call(e) => write!(f, "估算调用错误: {}", e),
            AppError::Job(e) => write!(f, "任务错误: {}", e),
            AppError::Worker(e) => write!(f, "Worker错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Input(e) => Some(e),
            AppError::Call(e) => Some(e),
            AppError::Job(e) => Some(e),
            AppError::Worker(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 输入数据集错误
///
/// 在计划（plan）阶段检测，属于致命错误：任何校验失败都不会落盘。
#[derive(Debug)]
pub enum InputError {
    /// 数据集为空（只有表头或完全为空）
    EmptyDataset { path: String },
    /// 缺少必需的列
    MissingColumn { path: String, column: String },
    /// 输入文件不存在
    NotFound { path: String },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::EmptyDataset { path } => {
                write!(f, "数据集为空: {}", path)
            }
            InputError::MissingColumn { path, column } => {
                write!(f, "数据集缺少必需的列 '{}': {}", column, path)
            }
            InputError::NotFound { path } => write!(f, "输入文件不存在: {}", path),
        }
    }
}

impl std::error::Error for InputError {}

/// 估算调用错误
///
/// 记录级错误，永远不会导致 chunk 中止：
/// - `Transient`：可重试（超时、频率限制、网络抖动）
/// - `Permanent`：不可重试（响应格式错误、内容无法解析）
#[derive(Debug)]
pub enum CallError {
    /// 瞬时失败，按有界重试策略重试后降级为记录级失败
    Transient { reason: String },
    /// 永久失败，立即记录并继续下一条
    Permanent { reason: String },
}

impl CallError {
    /// 是否可以重试
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient { .. })
    }

    /// 错误原因（不含分类前缀）
    pub fn reason(&self) -> &str {
        match self {
            CallError::Transient { reason } | CallError::Permanent { reason } => reason,
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Transient { reason } => write!(f, "瞬时失败(可重试): {}", reason),
            CallError::Permanent { reason } => write!(f, "永久失败(不可重试): {}", reason),
        }
    }
}

impl std::error::Error for CallError {}

/// 任务（Job）级错误
#[derive(Debug)]
pub enum JobError {
    /// 任务不存在（meta.json 缺失）
    NotFound { job_id: String },
    /// chunk 数据未就绪（缺少 .chunks_ready 标记）
    ChunksNotReady { job_id: String },
    /// 任务未全部完成（存在缺少 .done 标记的 chunk），合并被拒绝
    Incomplete { job_id: String, missing: Vec<String> },
    /// 输出文件中存在损坏的行（字段数与表头不符）
    ///
    /// 该错误只在本地处理（丢弃该行并继续），不向上传播。
    CorruptOutput {
        path: String,
        line_num: usize,
        fields: usize,
        expected: usize,
    },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound { job_id } => write!(f, "任务不存在: {}", job_id),
            JobError::ChunksNotReady { job_id } => {
                write!(
                    f,
                    "任务 {} 的 chunk 数据未就绪 (缺少 .chunks_ready 标记)",
                    job_id
                )
            }
            JobError::Incomplete { job_id, missing } => {
                write!(
                    f,
                    "任务 {} 未全部完成, 缺少 .done 标记的 chunk: {}",
                    job_id,
                    missing.join(", ")
                )
            }
            JobError::CorruptOutput {
                path,
                line_num,
                fields,
                expected,
            } => {
                write!(
                    f,
                    "输出文件 {} 第 {} 行损坏: {}/{} 个字段",
                    path, line_num, fields, expected
                )
            }
        }
    }
}

impl std::error::Error for JobError {}

/// Worker 进程错误
///
/// chunk 级错误：只影响所属 chunk 的本次执行，编排器继续处理其他 chunk。
#[derive(Debug)]
pub enum WorkerError {
    /// Worker 进程无法以指定的执行环境启动
    EnvironmentSetup {
        chunk_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Worker 进程以非零状态退出，chunk 保持未完成
    NonZeroExit { chunk_id: String, code: Option<i32> },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::EnvironmentSetup { chunk_id, source } => {
                write!(f, "chunk {} 的 worker 环境构建失败: {}", chunk_id, source)
            }
            WorkerError::NonZeroExit { chunk_id, code } => {
                write!(f, "chunk {} 的 worker 非零退出: {:?}", chunk_id, code)
            }
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::EnvironmentSetup { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            WorkerError::NonZeroExit { .. } => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound { path: String },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// JSON 解析失败
    JsonParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "写入文件失败 ({}): {}", path, source)
            }
            FileError::JsonParseFailed { path, source } => {
                write!(f, "JSON解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::WriteFailed { source, .. }
            | FileError::JsonParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 未知的估算器类型
    UnknownEstimator { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
            ConfigError::UnknownEstimator { value } => {
                write!(f, "未知的估算器类型: '{}' (支持 openai / mock)", value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::File(FileError::JsonParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<InputError> for AppError {
    fn from(err: InputError) -> Self {
        AppError::Input(err)
    }
}

impl From<CallError> for AppError {
    fn from(err: CallError) -> Self {
        AppError::Call(err)
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        AppError::Job(err)
    }
}

impl From<WorkerError> for AppError {
    fn from(err: WorkerError) -> Self {
        AppError::Worker(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建 worker 环境构建错误
    pub fn env_setup_failed(
        chunk_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Worker(WorkerError::EnvironmentSetup {
            chunk_id: chunk_id.into(),
            source: Box::new(source),
        })
    }
}

impl CallError {
    /// 创建瞬时失败
    pub fn transient(reason: impl Into<String>) -> Self {
        CallError::Transient {
            reason: reason.into(),
        }
    }

    /// 创建永久失败
    pub fn permanent(reason: impl Into<String>) -> Self {
        CallError::Permanent {
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
