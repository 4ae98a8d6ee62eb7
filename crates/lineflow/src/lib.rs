#![warn(missing_docs)]

//! `lineflow` 提供按换行边界刷写的字节流装饰器与配套工具。
//!
//! # 教案背景（Why）
//! - 日志采集、行协议转发等场景希望下游每次收到的都是完整行，但逐行触发系统调用代价过高；
//! - [`BatchLineWriter`] 把写入累积到阈值后，一次性刷写截至最后一个换行的全部完整行；
//! - [`PerLineWriter`] 则保证每个完整行恰好对应一次下游写入，适用于要求逐行分帧的接收端。
//!
//! # 使用概览（How）
//! - 下游通过 [`ByteSink`] 接入；任意 `std::io::Write` 可借助 [`WriterSink`] 桥接；
//! - 上游可以调用 `write`，也可以通过 [`BatchLineWriter::transfer_from`] 直接从 [`ByteSource`] 拉取；
//! - 阈值等参数既可以直接传入，也可以经 [`LineWriterConfig`] 从 TOML 加载。
//!
//! # 合约说明（What）
//! - 所有写入结果以 [`Progress`] 表达“计数 + 可选错误”，部分写入时二者同时存在；
//! - 错误统一收敛到 [`LineError`]，并提供稳定错误码；
//! - 诊断信息通过 `tracing` 事件输出，是否采集由调用方安装的 subscriber 决定。
//!
//! # 风险提示（Trade-offs）
//! - 两种写入器都不是线程安全的，跨线程共享需要调用方自行加锁；
//! - 不以换行结尾的残留数据只在 `close` 时写出，忘记关闭会丢失这部分数据。

mod batch;
mod buffer;
mod config;
mod error;
mod io;
mod per_line;
mod reader;
mod text;

pub use crate::batch::BatchLineWriter;
pub use crate::config::{
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_READ_CHUNK, LineWriterConfig, MAX_READ_CHUNK,
};
pub use crate::error::{LineError, Result};
pub use crate::io::{
    ByteSink, ByteSource, Progress, ReadOutcome, ReadStatus, ReaderSource, WriterSink,
};
pub use crate::per_line::PerLineWriter;
pub use crate::reader::LineTerminatedReader;
pub use crate::text::{count_lines, one_newline};
