//! 写入器配置。
//!
//! # 设计背景（Why）
//! - 刷写阈值与读取块大小通常来自部署配置而非硬编码，需要可反序列化、可校验的载体；
//! - 阈值以有符号整数承载，使“配置了负数”能被识别为配置错误，而不是在反序列化阶段变成难以理解的类型错误。
//!
//! # 契约说明（What）
//! - `flush_threshold` 必须大于 0；`read_chunk` 必须落在 `1..=`[`MAX_READ_CHUNK`] 内；
//! - 缺省值：阈值 [`DEFAULT_FLUSH_THRESHOLD`]，读取块 [`DEFAULT_READ_CHUNK`]；
//! - 未知字段视为错误，避免拼写错误被静默忽略。

use serde::Deserialize;

use crate::error::{LineError, Result};

/// 缺省刷写阈值（字节）。
pub const DEFAULT_FLUSH_THRESHOLD: i64 = 4096;

/// `transfer_from` 每轮向 source 请求的字节数。
pub const DEFAULT_READ_CHUNK: usize = 512;

/// `read_chunk` 的上限（1 MiB）。每轮读取都会预留这么多尾部空间，过大的取值会直接耗尽内存。
pub const MAX_READ_CHUNK: usize = 1 << 20;

/// [`BatchLineWriter`](crate::BatchLineWriter) 的配置。
///
/// ```
/// use lineflow::LineWriterConfig;
///
/// let config = LineWriterConfig::from_toml_str("flush_threshold = 512").unwrap();
/// assert_eq!(config.flush_threshold, 512);
/// assert_eq!(config.read_chunk, lineflow::DEFAULT_READ_CHUNK);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LineWriterConfig {
    /// 存活区达到该长度后，才会在最后一个换行处刷写。
    pub flush_threshold: i64,
    /// `transfer_from` 每轮读取的块大小。
    pub read_chunk: usize,
}

impl Default for LineWriterConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl LineWriterConfig {
    /// 使用指定阈值、缺省读取块构造配置。
    pub fn with_flush_threshold(flush_threshold: i64) -> Self {
        Self {
            flush_threshold,
            ..Self::default()
        }
    }

    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验全部字段。
    pub fn validate(&self) -> Result<()> {
        self.threshold()?;
        if self.read_chunk == 0 || self.read_chunk > MAX_READ_CHUNK {
            return Err(LineError::InvalidConfiguration {
                field: "read_chunk",
                detail: format!(
                    "must be between 1 and {MAX_READ_CHUNK}, got {}",
                    self.read_chunk
                ),
            });
        }
        Ok(())
    }

    /// 返回校验过的阈值。
    pub(crate) fn threshold(&self) -> Result<usize> {
        match usize::try_from(self.flush_threshold) {
            Ok(threshold) if threshold > 0 => Ok(threshold),
            _ => Err(invalid_threshold(self.flush_threshold)),
        }
    }
}

pub(crate) fn invalid_threshold(threshold: impl core::fmt::Display) -> LineError {
    LineError::InvalidConfiguration {
        field: "flush_threshold",
        detail: format!("must be greater than 0, got {threshold}"),
    }
}
