//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为行缓冲装饰器及其协作者（字节汇、字节源）提供统一的错误域；
//! - 区分“配置非法”“协作者违约”“底层 IO 失败”“生命周期误用”四类问题，方便调用方决定是否重试。
//!
//! ## 设计要求（What）
//! - 所有变体派生 [`thiserror::Error`]，保留底层 `std::io::Error` 作为 `source`；
//! - sink 返回的错误原样向上传递；[`LineError::ShortWrite`] 只在适配器或 sink 静默少写时补上；
//! - 存储容量溢出属于不可恢复的断言失败，走 panic 路径，不在本枚举中出现。

use std::io;

use thiserror::Error;

/// `lineflow` 全局统一的 `Result` 别名。
pub type Result<T, E = LineError> = core::result::Result<T, E>;

/// 行缓冲装饰器错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：sink 可能一次刷写混合了“旧缓冲 + 新数据”，调用方必须能区分是数据丢失、协作者违约，
///   还是仅仅对已关闭实例的误用。
/// - **契约 (What)**：
///   - 变体均为 `Send + Sync + 'static`，可以安全跨线程传递；
///   - [`LineError::code`] 返回稳定的点分错误码，适合作为日志字段或指标标签；
///   - 实现了到 [`io::Error`] 的转换，`std::io::Write` 适配路径直接借助 `?` 传播。
/// - **设计权衡 (Trade-offs)**：`InvalidConfiguration` 使用 `String` 承载细节，配置错误只发生在构造期，
///   额外的堆分配可以忽略。
#[derive(Debug, Error)]
pub enum LineError {
    /// 构造参数或配置文件取值非法，例如刷写阈值小于等于 0。
    #[error("invalid configuration for `{field}`: {detail}")]
    InvalidConfiguration {
        /// 出错的配置项名称。
        field: &'static str,
        /// 人类可读的失败原因。
        detail: String,
    },

    /// sink 报告的写入字节数超过了请求长度，属于协作者违约。
    #[error("invalid write result: sink reported {reported} bytes for a {requested}-byte write")]
    InvalidWrite {
        /// 本次请求写入的字节数。
        requested: usize,
        /// sink 声称已写入的字节数。
        reported: usize,
    },

    /// source 报告的读取字节数超过了所提供缓冲的长度，属于协作者违约。
    #[error("invalid read result: source reported {reported} bytes for a {capacity}-byte buffer")]
    InvalidRead {
        /// 提供给 source 的缓冲长度。
        capacity: usize,
        /// source 声称已读取的字节数。
        reported: usize,
    },

    /// sink 只接受了部分字节。
    #[error("short write: sink accepted {accepted} of {requested} bytes")]
    ShortWrite {
        /// 本次请求写入的字节数。
        requested: usize,
        /// sink 实际接受的字节数。
        accepted: usize,
    },

    /// 底层写入失败。
    #[error("cannot write: {0}")]
    Write(#[source] io::Error),

    /// 底层读取失败。
    #[error("cannot read: {0}")]
    Read(#[source] io::Error),

    /// 底层关闭（或最终 flush）失败。
    #[error("cannot close: {0}")]
    Close(#[source] io::Error),

    /// 实例已经关闭，不再接受写入或传输。
    #[error("line writer is closed")]
    Closed,

    /// 配置文本无法解析为 TOML。
    #[error("cannot parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl LineError {
    /// 返回稳定的错误码，形如 `lineflow.sink.short_write`。
    pub fn code(&self) -> &'static str {
        match self {
            LineError::InvalidConfiguration { .. } => "lineflow.config.invalid",
            LineError::InvalidWrite { .. } => "lineflow.sink.invalid_write",
            LineError::InvalidRead { .. } => "lineflow.source.invalid_read",
            LineError::ShortWrite { .. } => "lineflow.sink.short_write",
            LineError::Write(_) => "lineflow.sink.write",
            LineError::Read(_) => "lineflow.source.read",
            LineError::Close(_) => "lineflow.sink.close",
            LineError::Closed => "lineflow.writer.closed",
            LineError::Config(_) => "lineflow.config.parse",
        }
    }

    /// 是否为协作者违反字节计数契约（返回的计数越界）。
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LineError::InvalidWrite { .. } | LineError::InvalidRead { .. }
        )
    }
}

impl From<LineError> for io::Error {
    /// 将错误域折算为 `std::io::Error`。
    ///
    /// - IO 包装变体直接交还原始错误，保留 `ErrorKind`；
    /// - 部分写映射为 [`io::ErrorKind::WriteZero`]，与 `Write::write_all` 的语义一致；
    /// - 其余变体按语义挑选最接近的 `ErrorKind`，原错误作为 payload 保留。
    fn from(err: LineError) -> Self {
        match err {
            LineError::Write(inner) | LineError::Read(inner) | LineError::Close(inner) => inner,
            LineError::ShortWrite { .. } => io::Error::new(io::ErrorKind::WriteZero, err),
            LineError::InvalidConfiguration { .. } | LineError::Config(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            LineError::InvalidWrite { .. } | LineError::InvalidRead { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            LineError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, err),
        }
    }
}
