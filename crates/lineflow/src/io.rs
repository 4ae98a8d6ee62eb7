//! 字节汇（sink）与字节源（source）契约。
//!
//! # 模块定位（Why）
//! - 行缓冲装饰器需要一个允许“部分写 + 错误同时返回”的下游契约，而 `std::io::Write`
//!   要么返回计数、要么返回错误，无法表达“写了 4 字节然后失败”的组合；
//! - 同理，`std::io::Read` 用 `Ok(0)` 表达流结束，无法在同一次调用里同时返回数据与结束信号。
//!
//! # 设计概要（How）
//! - [`ByteSink`] / [`ByteSource`] 以 [`Progress`] / [`ReadOutcome`] 作为返回值，计数与信号并存；
//! - [`WriterSink`] / [`ReaderSource`] 把任意 `std::io` 实现桥接进来；
//! - `Vec<u8>`、[`bytes::BytesMut`] 直接实现 [`ByteSink`]，`&[u8]` 直接实现 [`ByteSource`]，
//!   便于内存中组装流水线。
//!
//! # 契约说明（What）
//! - sink 报告的计数必须满足 `0 <= count <= buf.len()`；计数小于请求长度时应同时返回错误；
//! - source 报告的计数必须满足 `0 <= count <= buf.len()`；无数据时返回 0，而不是阻塞。

use std::io;

use bytes::{BufMut, BytesMut};

use crate::error::LineError;

/// 一次写入或传输的结果：已处理的计数与可选错误。
///
/// 计数与错误可以同时存在，用于表达部分完成。
#[derive(Debug)]
#[must_use = "a Progress may carry an error that must be inspected"]
pub struct Progress<N = usize> {
    /// 已处理的字节数。
    pub count: N,
    /// 处理过程中遇到的错误；`None` 表示完全成功。
    pub error: Option<LineError>,
}

impl<N> Progress<N> {
    /// 完全成功。
    pub fn done(count: N) -> Self {
        Self { count, error: None }
    }

    /// 部分完成后失败。
    pub fn failed(count: N, error: LineError) -> Self {
        Self {
            count,
            error: Some(error),
        }
    }

    /// 是否没有错误。
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 拆分为 `(count, error)` 元组。
    pub fn into_parts(self) -> (N, Option<LineError>) {
        (self.count, self.error)
    }

    /// 折算为 `Result`；出错时丢弃计数。
    pub fn into_result(self) -> Result<N, LineError> {
        match self.error {
            None => Ok(self.count),
            Some(err) => Err(err),
        }
    }
}

/// source 单次读取后的流状态。
#[derive(Debug)]
pub enum ReadStatus {
    /// 仍可继续读取。
    Open,
    /// 流已结束；同一次调用中返回的字节仍然有效。
    Eof,
    /// 读取失败；同一次调用中返回的字节仍然有效。
    Failed(LineError),
}

/// 一次 [`ByteSource::read_bytes`] 的结果。
#[derive(Debug)]
#[must_use]
pub struct ReadOutcome {
    /// 写入调用方缓冲的字节数。
    pub count: usize,
    /// 读取之后的流状态。
    pub status: ReadStatus,
}

impl ReadOutcome {
    /// 读到了 `count` 字节，流仍然打开。
    pub fn more(count: usize) -> Self {
        Self {
            count,
            status: ReadStatus::Open,
        }
    }

    /// 读到了 `count` 字节（可为 0），流随之结束。
    pub fn eof(count: usize) -> Self {
        Self {
            count,
            status: ReadStatus::Eof,
        }
    }

    /// 读到了 `count` 字节（可为 0）后失败。
    pub fn failed(count: usize, error: LineError) -> Self {
        Self {
            count,
            status: ReadStatus::Failed(error),
        }
    }
}

/// `ByteSink` 描述带关闭语义的字节汇。
///
/// # 教案式说明
/// - **意图 (Why)**：装饰器的字节记账依赖“本次调用到底被接受了多少字节”，因此契约必须允许
///   同时返回计数与错误，这一点与 `std::io::Write` 不同。
/// - **契约 (What)**：
///   - `write_bytes` 返回的 `count` 必须不大于 `buf.len()`；小于时应附带错误，
///     否则装饰器会将其视为 [`LineError::ShortWrite`]；
///   - `close` 完成最终化并释放资源；之后装饰器不会再调用任何方法。
/// - **风险提示 (Trade-offs)**：装饰器从不重试，重试策略属于调用方或 sink 自身。
pub trait ByteSink {
    /// 写入 `buf`，返回实际接受的字节数与可选错误。
    fn write_bytes(&mut self, buf: &[u8]) -> Progress;

    /// 最终化并关闭 sink。
    fn close(&mut self) -> Result<(), LineError>;
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        (**self).write_bytes(buf)
    }

    fn close(&mut self) -> Result<(), LineError> {
        (**self).close()
    }
}

impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        (**self).write_bytes(buf)
    }

    fn close(&mut self) -> Result<(), LineError> {
        (**self).close()
    }
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        self.extend_from_slice(buf);
        Progress::done(buf.len())
    }

    fn close(&mut self) -> Result<(), LineError> {
        Ok(())
    }
}

impl ByteSink for BytesMut {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        self.put_slice(buf);
        Progress::done(buf.len())
    }

    fn close(&mut self) -> Result<(), LineError> {
        Ok(())
    }
}

/// `ByteSource` 描述可分批读取的字节源。
///
/// - `read_bytes` 返回的 `count` 必须不大于 `buf.len()`；
/// - 暂无数据时返回 `count == 0` 与 [`ReadStatus::Open`]；
/// - 流结束或失败时，同一次调用仍可携带最后一批数据。
pub trait ByteSource {
    /// 读取至多 `buf.len()` 字节到 `buf`。
    fn read_bytes(&mut self, buf: &mut [u8]) -> ReadOutcome;
}

impl<R: ByteSource + ?Sized> ByteSource for &mut R {
    fn read_bytes(&mut self, buf: &mut [u8]) -> ReadOutcome {
        (**self).read_bytes(buf)
    }
}

impl ByteSource for &[u8] {
    fn read_bytes(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if self.is_empty() {
            return ReadOutcome::eof(0);
        }
        let n = buf.len().min(self.len());
        let (head, tail) = self.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = tail;
        ReadOutcome::more(n)
    }
}

/// 把 `std::io::Write` 适配为 [`ByteSink`]。
///
/// - 每次 `write_bytes` 只调用一次底层 `write`（遇到 `Interrupted` 时重试），
///   底层返回较短的 `Ok(n)` 时折算为 [`LineError::ShortWrite`]；
/// - `close` 调用底层 `flush`，随后由 `Drop` 释放资源。
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
}

impl<W: io::Write> WriterSink<W> {
    /// 包装底层写入器。
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// 借用底层写入器。
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// 可变借用底层写入器。
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// 取回底层写入器。
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> ByteSink for WriterSink<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        loop {
            match self.inner.write(buf) {
                Ok(n) if n >= buf.len() => return Progress::done(n),
                Ok(n) => {
                    return Progress::failed(
                        n,
                        LineError::ShortWrite {
                            requested: buf.len(),
                            accepted: n,
                        },
                    );
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Progress::failed(0, LineError::Write(err)),
            }
        }
    }

    fn close(&mut self) -> Result<(), LineError> {
        self.inner.flush().map_err(LineError::Close)
    }
}

/// 把 `std::io::Read` 适配为 [`ByteSource`]。
///
/// 底层 `Ok(0)`（且缓冲非空）映射为 [`ReadStatus::Eof`]，`Interrupted` 自动重试。
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: io::Read> ReaderSource<R> {
    /// 包装底层读取器。
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// 取回底层读取器。
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read> ByteSource for ReaderSource<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if buf.is_empty() {
            return ReadOutcome::more(0);
        }
        loop {
            match self.inner.read(buf) {
                Ok(0) => return ReadOutcome::eof(0),
                Ok(n) => return ReadOutcome::more(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return ReadOutcome::failed(0, LineError::Read(err)),
            }
        }
    }
}

/// 调用 sink 并把违约的计数折算为统一错误。
///
/// - 计数超过请求长度：`(0, InvalidWrite)`，调用方应视作什么都没发生；
/// - 计数不足但没有错误：补上 [`LineError::ShortWrite`]。
pub(crate) fn checked_write<S: ByteSink + ?Sized>(sink: &mut S, buf: &[u8]) -> Progress {
    let requested = buf.len();
    let Progress { count, error } = sink.write_bytes(buf);
    if count > requested {
        return Progress::failed(
            0,
            LineError::InvalidWrite {
                requested,
                reported: count,
            },
        );
    }
    match error {
        Some(err) => Progress::failed(count, err),
        None if count < requested => Progress::failed(
            count,
            LineError::ShortWrite {
                requested,
                accepted: count,
            },
        ),
        None => Progress::done(count),
    }
}

/// 写出剩余字节后关闭 sink：写入错误优先于关闭错误。
///
/// 写入失败时仍会尽力关闭 sink，但只报告写入错误。
pub(crate) fn drain_and_close<S: ByteSink>(mut sink: S, pending: &[u8]) -> Result<(), LineError> {
    if !pending.is_empty()
        && let Some(write_err) = checked_write(&mut sink, pending).error
    {
        if let Err(close_err) = sink.close() {
            tracing::debug!(
                code = close_err.code(),
                error = %close_err,
                "sink close failed after write error; reporting the write error"
            );
        }
        return Err(write_err);
    }
    sink.close()
}
