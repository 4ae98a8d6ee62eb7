//! 逐行刷写的写入装饰器。
//!
//! # 契约（What）
//! - 每个完整行对应恰好一次 sink 写入，不做阈值合并；
//! - 写入总是全额吸收，sink 失败留下的字节在下一次写入或关闭时继续处理。

use core::fmt;
use std::io;

use memchr::memchr;
use tracing::{debug, trace, warn};

use crate::buffer::LineBuffer;
use crate::error::{LineError, Result};
use crate::io::{ByteSink, Progress, checked_write, drain_and_close};

/// 每个完整行恰好触发一次下游写入的写入装饰器。
///
/// # 教案式说明
/// - **意图 (Why)**：部分接收端按“一次写入 = 一条记录”分帧（例如 syslog 报文、按行计费的上报通道），
///   它们需要行缓冲而不是批量缓冲；
/// - **逻辑 (How)**：`write` 把数据追加到与 [`BatchLineWriter`](crate::BatchLineWriter) 相同的
///   滑动缓冲中，从新数据起始处寻找换行，每找到一个就把 `[offset, 换行]` 交给 sink；
/// - **契约 (What)**：
///   - `write` 总是吸收全部输入，返回计数恒为 `data.len()`；sink 出错时附带错误，
///     未送达的字节留在缓冲中，下次 `write` 或 `close` 时继续处理；
///   - `close` 写出不以换行结尾的残留字节后关闭 sink，写入错误优先于关闭错误；
/// - **风险 (Trade-offs)**：每行一次 sink 调用，行很短时开销明显高于批量写入。
///
/// ```
/// use lineflow::PerLineWriter;
///
/// let mut writer = PerLineWriter::new(Vec::new());
/// assert!(writer.write(b"a\nb\nc").is_ok());
/// assert_eq!(writer.get_ref().unwrap().as_slice(), b"a\nb\n");
/// assert_eq!(writer.buffered(), b"c");
/// ```
pub struct PerLineWriter<S: ByteSink> {
    storage: LineBuffer,
    sink: Option<S>,
    /// 上一次刷写失败后，存活区内可能仍有换行，需要从头扫描。
    stalled: bool,
}

impl<S: ByteSink> PerLineWriter<S> {
    /// 包装 `sink`。
    pub fn new(sink: S) -> Self {
        Self {
            storage: LineBuffer::default(),
            sink: Some(sink),
            stalled: false,
        }
    }

    /// 尚未交给 sink 的字节。
    pub fn buffered(&self) -> &[u8] {
        self.storage.live()
    }

    /// 是否已经关闭。
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// 借用底层 sink；关闭后为 `None`。
    pub fn get_ref(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// 追加 `data`，并把其中每个完整行分别写给 sink。
    pub fn write(&mut self, data: &[u8]) -> Progress {
        let Some(sink) = self.sink.as_mut() else {
            return Progress::failed(0, LineError::Closed);
        };
        let reserved = self.storage.append(data);
        let mut search = if self.stalled {
            self.storage.offset()
        } else {
            reserved.at
        };

        let mut lines = 0usize;
        while let Some(idx) = memchr(b'\n', self.storage.slice(search, self.storage.end())) {
            let end = search + idx + 1;
            let Progress {
                count: written,
                error,
            } = checked_write(sink, self.storage.live_to(end));
            if let Some(err) = error {
                if !err.is_contract_violation() {
                    self.storage.consume(written);
                }
                self.stalled = true;
                debug!(
                    written,
                    retained = self.storage.len(),
                    code = err.code(),
                    "per-line write failed"
                );
                return Progress::failed(data.len(), err);
            }
            self.storage.consume(written);
            lines += 1;
            search = end;
        }
        self.stalled = false;
        trace!(lines, remaining = self.storage.len(), "per-line write");
        Progress::done(data.len())
    }

    /// 写出不以换行结尾的残留字节，然后关闭 sink。
    ///
    /// 返回后实例处于关闭状态；重复调用返回 `Ok(())`。
    pub fn close(&mut self) -> Result<()> {
        let Some(sink) = self.sink.take() else {
            debug!("close on a closed PerLineWriter ignored");
            return Ok(());
        };
        debug!(pending = self.storage.len(), "closing PerLineWriter");
        let result = drain_and_close(sink, self.storage.live());
        self.storage.release();
        self.stalled = false;
        result
    }
}

impl<S: ByteSink> io::Write for PerLineWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PerLineWriter::write(self, buf).into_result().map_err(Into::into)
    }

    /// 完整行在 `write` 中已经送出，这里无事可做。
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSink> fmt::Debug for PerLineWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerLineWriter")
            .field("buffered", &self.storage.len())
            .field("stalled", &self.stalled)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<S: ByteSink> Drop for PerLineWriter<S> {
    fn drop(&mut self) {
        if self.sink.is_some() && !self.storage.is_empty() {
            warn!(
                buffered = self.storage.len(),
                "PerLineWriter dropped without close; buffered bytes discarded"
            );
        }
    }
}
