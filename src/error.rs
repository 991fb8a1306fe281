//! 统一错误处理框架
//!
//! 区分两类失败：
//! - 整体输入完整性错误（致命，立即中止整个运行，并指明出错的峰号/实验）
//! - 单个峰或单个实验对的局部错误（降级为缺失值 + 日志记录，运行继续）

use std::fmt;
use std::io;

/// 合并引擎的统一错误类型
#[derive(Debug)]
pub enum ConsensusError {
    /// 输入完整性错误 - 致命
    ///
    /// 对齐峰没有任何实验检出，或三张对齐表的峰号/实验集合不一致。
    InputIntegrity {
        peak_number: Option<u32>,
        experiment: Option<String>,
        reason: String,
    },

    /// 参数/配置验证失败
    InvalidInput(String),

    /// 单个质谱对比较失败（仅在峰内部使用，对外降级为缺失分数）
    Similarity(String),

    /// 单个对齐峰处理超时
    SlotTimeout { peak_number: u32, elapsed_ms: u128 },

    /// 运行已被中止，尚未开始的峰被跳过
    Cancelled,

    /// 文件I/O错误
    IoError(io::Error),

    /// JSON序列化/反序列化错误
    Serialization(String),

    /// 资源访问错误（线程池创建等）
    ResourceError(String),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::InputIntegrity {
                peak_number,
                experiment,
                reason,
            } => {
                write!(f, "输入完整性错误 / input integrity error")?;
                if let Some(peak) = peak_number {
                    write!(f, " [peak {peak}]")?;
                }
                if let Some(name) = experiment {
                    write!(f, " [experiment {name}]")?;
                }
                write!(f, ": {reason}")
            }
            ConsensusError::InvalidInput(msg) => write!(f, "输入验证失败: {msg}"),
            ConsensusError::Similarity(msg) => write!(f, "质谱相似度计算失败: {msg}"),
            ConsensusError::SlotTimeout {
                peak_number,
                elapsed_ms,
            } => write!(f, "峰 {peak_number} 处理超时 ({elapsed_ms} ms)"),
            ConsensusError::Cancelled => write!(f, "运行已中止"),
            ConsensusError::IoError(err) => write!(f, "文件I/O错误: {err}"),
            ConsensusError::Serialization(msg) => write!(f, "JSON序列化错误: {msg}"),
            ConsensusError::ResourceError(msg) => write!(f, "资源访问错误: {msg}"),
        }
    }
}

impl std::error::Error for ConsensusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsensusError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConsensusError {
    fn from(err: io::Error) -> Self {
        ConsensusError::IoError(err)
    }
}

impl From<serde_json::Error> for ConsensusError {
    fn from(err: serde_json::Error) -> Self {
        ConsensusError::Serialization(err.to_string())
    }
}

/// 合并引擎操作的标准Result类型
pub type ConsensusResult<T> = Result<T, ConsensusError>;

// ==================== 错误构造Helper函数 ====================

/// 创建指向具体峰号的完整性错误
#[inline]
pub fn integrity_error(peak_number: u32, reason: impl Into<String>) -> ConsensusError {
    ConsensusError::InputIntegrity {
        peak_number: Some(peak_number),
        experiment: None,
        reason: reason.into(),
    }
}

/// 创建指向具体峰号和实验的完整性错误
#[inline]
pub fn integrity_error_at(
    peak_number: u32,
    experiment: &str,
    reason: impl Into<String>,
) -> ConsensusError {
    ConsensusError::InputIntegrity {
        peak_number: Some(peak_number),
        experiment: Some(experiment.to_string()),
        reason: reason.into(),
    }
}

/// 创建相似度计算错误的helper函数
#[inline]
pub fn similarity_error<E: fmt::Display>(context: &str, err: E) -> ConsensusError {
    ConsensusError::Similarity(format!("{context}: {err}"))
}

// ==================== 错误分类系统 ====================

/// 错误类别枚举（用于CLI退出码和建议文本）
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ErrorCategory {
    /// 输入数据不一致
    Integrity,
    /// 计算相关错误（相似度、超时）
    Computation,
    /// I/O与序列化
    Io,
    /// 线程池等运行资源
    Resource,
    /// 其他未分类错误
    Other,
}

impl ErrorCategory {
    /// 从ConsensusError提取错误类别
    pub fn from_error(e: &ConsensusError) -> Self {
        match e {
            ConsensusError::InputIntegrity { .. } => Self::Integrity,
            ConsensusError::Similarity(_) | ConsensusError::SlotTimeout { .. } => {
                Self::Computation
            }
            ConsensusError::IoError(_) | ConsensusError::Serialization(_) => Self::Io,
            ConsensusError::ResourceError(_) | ConsensusError::Cancelled => Self::Resource,
            ConsensusError::InvalidInput(_) => Self::Other,
        }
    }

    /// 获取错误类别的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Integrity => "输入完整性错误",
            Self::Computation => "计算错误",
            Self::Io => "I/O错误",
            Self::Resource => "资源错误",
            Self::Other => "其他错误",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_error_names_peak_and_experiment() {
        let err = integrity_error_at(42, "Run B", "rt present but area missing");
        let msg = err.to_string();
        assert!(msg.contains("peak 42"));
        assert!(msg.contains("experiment Run B"));
        assert!(msg.contains("area missing"));
        assert_eq!(ErrorCategory::from_error(&err), ErrorCategory::Integrity);
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error;
        let err = ConsensusError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert_eq!(ErrorCategory::from_error(&err), ErrorCategory::Io);
    }

    #[test]
    fn timeout_is_computation_category() {
        let err = ConsensusError::SlotTimeout {
            peak_number: 7,
            elapsed_ms: 1500,
        };
        assert!(err.to_string().contains('7'));
        assert_eq!(ErrorCategory::from_error(&err), ErrorCategory::Computation);
    }
}
