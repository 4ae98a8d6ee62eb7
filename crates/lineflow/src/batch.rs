//! 按阈值批量刷写完整行的写入装饰器。
//!
//! # 模块定位（Why）
//! - 上游按任意切分写入字节，下游希望只收到以换行结尾、且尽量合并的大块；
//! - 存储复用 [`LineBuffer`](crate::buffer::LineBuffer)，本模块只负责换行跟踪、刷写判定与部分写记账。
//!
//! # 契约（What）
//! - 存活区内最后一个换行的位置始终被准确跟踪，刷写恰好止于该换行之后；
//! - 存活区长度未达阈值时不刷写；刷写失败时只报告本次新数据中真正送达的字节数。

use core::fmt;
use std::io;

use memchr::memrchr;
use tracing::{debug, trace, warn};

use crate::buffer::{LineBuffer, Reserved};
use crate::config::{DEFAULT_READ_CHUNK, LineWriterConfig, invalid_threshold};
use crate::error::{LineError, Result};
use crate::io::{
    ByteSink, ByteSource, Progress, ReadOutcome, ReadStatus, checked_write, drain_and_close,
};

/// 按换行边界批量刷写的写入装饰器。
///
/// # 设计动机（Why）
/// - 日志、行协议等下游希望每次收到的都是完整行，同时又不希望每一行都触发一次底层写入；
/// - 本类型把写入累积在内部缓冲中，只有当存活区长度达到阈值时，才把“截至最后一个换行”的字节一次性交给 sink，
///   一次刷写可能包含多行。
///
/// # 行为概览（How）
/// - `write` / `transfer_from` 追加数据并维护 `final_newline`（存活区中最后一个 `\n` 的绝对下标）；
/// - 满足“长度 >= 阈值且存在换行”时刷写 `[offset, final_newline]`；
/// - sink 部分写失败时按“本次调用的新数据被写出了多少”记账，详见 [`BatchLineWriter::write`]；
/// - `close` 把不以换行结尾的残留字节原样写出，再关闭 sink。
///
/// # 契约说明（What）
/// - **不变式**：`final_newline` 永远等于存活区中最右侧的 `\n`，不存在时为 `None`；
/// - **状态机**：`Open -> Closed`。关闭后 `write` / `transfer_from` 返回 [`LineError::Closed`]，
///   再次 `close` 为无操作并返回 `Ok(())`；
/// - **前置条件**：单一所有者顺序调用，类型不提供内部同步。
///
/// # 风险与取舍（Trade-offs）
/// - 不以换行结尾的数据只会在 `close` 时写出，调用方必须关闭写入器，否则残留数据会随 `Drop` 丢失；
/// - 刷写成功路径不重新扫描换行：成功刷写到最后一个换行之后，存活区内不可能再有换行。
///
/// ```
/// use lineflow::BatchLineWriter;
///
/// let mut out = Vec::new();
/// let mut writer = BatchLineWriter::new(&mut out, 8).unwrap();
/// assert_eq!(writer.write(b"line 1\n").into_result().unwrap(), 7);
/// assert_eq!(writer.write(b"line 2").into_result().unwrap(), 6);
/// assert_eq!(writer.buffered(), b"line 2");
/// writer.close().unwrap();
/// drop(writer);
/// assert_eq!(out, b"line 1\nline 2");
/// ```
pub struct BatchLineWriter<S: ByteSink> {
    storage: LineBuffer,
    sink: Option<S>,
    threshold: usize,
    read_chunk: usize,
    final_newline: Option<usize>,
}

impl<S: ByteSink> BatchLineWriter<S> {
    /// 以刷写阈值 `threshold` 包装 `sink`。
    ///
    /// 阈值为 0 时返回 [`LineError::InvalidConfiguration`]。
    pub fn new(sink: S, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(invalid_threshold(threshold));
        }
        Ok(Self::assemble(sink, threshold, DEFAULT_READ_CHUNK))
    }

    /// 按配置构造，阈值小于等于 0 或读取块为 0 时返回 [`LineError::InvalidConfiguration`]。
    pub fn with_config(sink: S, config: &LineWriterConfig) -> Result<Self> {
        config.validate()?;
        let threshold = config.threshold()?;
        Ok(Self::assemble(sink, threshold, config.read_chunk))
    }

    fn assemble(sink: S, threshold: usize, read_chunk: usize) -> Self {
        Self {
            storage: LineBuffer::default(),
            sink: Some(sink),
            threshold,
            read_chunk,
            final_newline: None,
        }
    }

    /// 刷写阈值。
    pub fn threshold(&self) -> usize {
        self.threshold
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

    /// 追加 `data`，必要时刷写到最后一个换行。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：对调用方而言，未触发刷写的写入总是“全部吸收”，返回 `(data.len(), None)`；
    /// - **逻辑 (How)**：
    ///   1. 记录追加前的存活区长度 `prior`；
    ///   2. 追加 `data`，若 `data` 含换行则把 `final_newline` 更新为其中最后一个换行；
    ///   3. 存活区长度达到阈值且存在换行时，刷写 `[offset, final_newline + 1)`；
    /// - **契约 (What)**：刷写失败时，返回值的计数是“本次 `data` 中真正到达 sink 的字节数”：
    ///   - sink 接受的字节覆盖了全部旧缓冲：计数为超出部分，未送达的新数据尾部留在缓冲中，由 `close` 写出；
    ///   - sink 连旧缓冲都没写完：计数为 0，本次 `data` 整体丢弃，缓冲只保留旧数据中未送达的后缀；
    ///   - 两种情况都会重新扫描存活区以恢复 `final_newline`。
    pub fn write(&mut self, data: &[u8]) -> Progress {
        if self.sink.is_none() {
            return Progress::failed(0, LineError::Closed);
        }
        let prior = self.storage.len();
        let reserved = self.storage.append(data);
        self.absorb(reserved, data.len());
        trace!(
            prior,
            appended = data.len(),
            final_newline = ?self.final_newline,
            "buffered write"
        );

        match self.flush_point() {
            Some(end) => self.flush_through(prior, data.len(), end),
            None => Progress::done(data.len()),
        }
    }

    /// 从 `source` 直接读入内部缓冲，沿途刷写完整行。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：省去调用方自己的中转缓冲，对应 “copy” 惯用法；
    /// - **逻辑 (How)**：每轮在尾部预留读取块，读入后更新换行位置，满足阈值即刷写；
    /// - **契约 (What)**：
    ///   - 返回值计数为从 `source` 读取的总字节数；
    ///   - 流结束时返回 `(total, None)`，不以换行结尾的尾巴**不会**刷写，需要调用 `close`；
    ///   - source 失败时返回 `(total, err)`，同样不刷写尾巴；
    ///   - 刷写失败时返回 `(total + 刷写计数, err)`；
    ///   - source 报告的计数超过读取块时返回 [`LineError::InvalidRead`]。
    pub fn transfer_from<R: ByteSource + ?Sized>(&mut self, source: &mut R) -> Progress<u64> {
        if self.sink.is_none() {
            return Progress::failed(0, LineError::Closed);
        }
        let mut total: u64 = 0;
        loop {
            let prior = self.storage.len();
            let chunk = self.read_chunk;
            let reserved = self.storage.grow(chunk);
            let at = reserved.at;
            let ReadOutcome { count, status } =
                source.read_bytes(self.storage.slice_mut(at, at + chunk));
            if count > chunk {
                self.storage.truncate_to(at);
                self.shift_newline(reserved.shifted);
                return Progress::failed(
                    total,
                    LineError::InvalidRead {
                        capacity: chunk,
                        reported: count,
                    },
                );
            }
            self.storage.truncate_to(at + count);
            self.absorb(reserved, count);

            if let Some(end) = self.flush_point() {
                let flushed = self.flush_through(prior, count, end);
                if let Some(err) = flushed.error {
                    return Progress::failed(total + flushed.count as u64, err);
                }
            }

            total += count as u64;
            match status {
                ReadStatus::Open => {}
                ReadStatus::Eof => return Progress::done(total),
                ReadStatus::Failed(err) => return Progress::failed(total, err),
            }
        }
    }

    /// 忽略阈值，立即刷写截至最后一个换行的全部完整行。
    ///
    /// 没有完整行时不调用 sink。
    pub fn flush_completed_lines(&mut self) -> Result<()> {
        if self.sink.is_none() {
            return Err(LineError::Closed);
        }
        match self.tracked_newline() {
            Some(newline) => {
                let prior = self.storage.len();
                self.flush_through(prior, 0, newline + 1).into_result().map(|_| ())
            }
            None => Ok(()),
        }
    }

    /// 写出全部缓冲（无论是否以换行结尾），然后关闭 sink。
    ///
    /// - 写入失败时仍尽力关闭 sink，但报告写入错误；
    /// - 写入成功而关闭失败时报告关闭错误；
    /// - 无论成败，返回后实例都处于关闭状态；重复调用返回 `Ok(())`。
    pub fn close(&mut self) -> Result<()> {
        let Some(sink) = self.sink.take() else {
            debug!("close on a closed BatchLineWriter ignored");
            return Ok(());
        };
        debug!(pending = self.storage.len(), "closing BatchLineWriter");
        let result = drain_and_close(sink, self.storage.live());
        self.storage.release();
        self.final_newline = None;
        result
    }

    /// 新字节落入 `[reserved.at, reserved.at + appended)` 之后，修正并更新换行位置。
    fn absorb(&mut self, reserved: Reserved, appended: usize) {
        self.shift_newline(reserved.shifted);
        let fresh = self.storage.slice(reserved.at, reserved.at + appended);
        if let Some(idx) = memrchr(b'\n', fresh) {
            self.final_newline = Some(reserved.at + idx);
        }
    }

    fn shift_newline(&mut self, shifted: usize) {
        if shifted != 0 {
            self.final_newline = self
                .final_newline
                .and_then(|idx| idx.checked_sub(shifted));
        }
    }

    /// 仍位于存活区内的换行位置。
    fn tracked_newline(&self) -> Option<usize> {
        self.final_newline
            .filter(|&idx| idx >= self.storage.offset() && idx < self.storage.end())
    }

    /// 满足刷写条件时返回刷写终点（不含）。
    fn flush_point(&self) -> Option<usize> {
        if self.storage.len() < self.threshold {
            return None;
        }
        self.tracked_newline().map(|idx| idx + 1)
    }

    /// 把 `[offset, end)` 交给 sink，并按 `prior` / `appended` 记账。
    fn flush_through(&mut self, prior: usize, appended: usize, end: usize) -> Progress {
        let Some(sink) = self.sink.as_mut() else {
            return Progress::failed(0, LineError::Closed);
        };
        let Progress {
            count: written,
            error,
        } = checked_write(sink, self.storage.live_to(end));

        let err = match error {
            None => {
                self.storage.consume(written);
                self.final_newline = None;
                trace!(written, remaining = self.storage.len(), "flushed completed lines");
                return Progress::done(appended);
            }
            Some(err @ LineError::InvalidWrite { .. }) => return Progress::failed(0, err),
            Some(err) => err,
        };

        self.storage.consume(written);
        let count = match written.checked_sub(prior) {
            Some(fresh) => fresh,
            None => {
                let end = self.storage.offset() + (prior - written);
                self.storage.truncate_to(end);
                0
            }
        };
        self.final_newline = self.storage.last_newline();
        debug!(
            written,
            prior,
            appended,
            reported = count,
            retained = self.storage.len(),
            code = err.code(),
            "partial flush"
        );
        Progress::failed(count, err)
    }
}

impl<S: ByteSink> io::Write for BatchLineWriter<S> {
    /// 任何 sink 失败都作为 `Err` 返回，即便部分新数据已送达：
    /// 未送达的尾部仍在缓冲中，若返回 `Ok(n)` 会让 `write_all` 重复提交这部分数据。
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (count, error) = BatchLineWriter::write(self, buf).into_parts();
        match error {
            None => Ok(count),
            Some(err) => Err(err.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_completed_lines().map_err(Into::into)
    }
}

impl<S: ByteSink> fmt::Debug for BatchLineWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLineWriter")
            .field("threshold", &self.threshold)
            .field("buffered", &self.storage.len())
            .field("final_newline", &self.final_newline)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<S: ByteSink> Drop for BatchLineWriter<S> {
    fn drop(&mut self) {
        if self.sink.is_some() && !self.storage.is_empty() {
            warn!(
                buffered = self.storage.len(),
                "BatchLineWriter dropped without close; buffered bytes discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    /// 每次至多接受 `limit` 字节，超出即报告部分写的 sink。
    struct Capped {
        out: Vec<u8>,
        limit: usize,
    }

    impl ByteSink for Capped {
        fn write_bytes(&mut self, buf: &[u8]) -> Progress {
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                Progress::failed(
                    n,
                    LineError::ShortWrite {
                        requested: buf.len(),
                        accepted: n,
                    },
                )
            } else {
                Progress::done(n)
            }
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn capped(limit: usize, threshold: usize) -> BatchLineWriter<Capped> {
        BatchLineWriter::new(
            Capped {
                out: Vec::new(),
                limit,
            },
            threshold,
        )
        .expect("threshold is positive")
    }

    fn sink_output(writer: &BatchLineWriter<Capped>) -> &[u8] {
        &writer.get_ref().expect("writer is open").out
    }

    fn expected_newline(writer: &BatchLineWriter<Capped>) -> Option<usize> {
        memrchr(b'\n', writer.buffered()).map(|idx| idx + writer.storage.offset())
    }

    #[test]
    fn non_flushing_writes_track_final_newline() {
        let mut writer = capped(usize::MAX, 64);
        assert!(writer.write(b"line 1\nline 2\n").is_ok());
        assert_eq!(writer.final_newline, Some(13));
        assert!(writer.write(b"line 3\nline 4").is_ok());
        assert_eq!(writer.final_newline, Some(20));
        assert!(writer.write(b" tail").is_ok());
        assert_eq!(writer.final_newline, Some(20));
        assert!(sink_output(&writer).is_empty());
    }

    #[test]
    fn successful_flush_clears_final_newline() {
        let mut writer = capped(usize::MAX, 8);
        let outcome = writer.write(b"terminated\nline");
        assert_eq!(outcome.into_result().unwrap(), 15);
        assert_eq!(writer.buffered(), b"line");
        assert_eq!(writer.final_newline, None);
        assert_eq!(sink_output(&writer), b"terminated\n");
    }

    #[test]
    fn partial_flush_of_new_data_keeps_unsent_tail() {
        let mut writer = capped(4, 16);
        let (count, err) = writer.write(b"terminated line\n").into_parts();
        assert_eq!(count, 4);
        assert!(matches!(err, Some(LineError::ShortWrite { .. })));
        assert_eq!(writer.buffered(), b"inated line\n");
        assert_eq!(writer.final_newline, expected_newline(&writer));
        assert_eq!(sink_output(&writer), b"term");
    }

    #[test]
    fn partial_flush_of_old_data_drops_new_data() {
        let mut writer = capped(4, 16);
        assert_eq!(writer.write(b"line 1\nline 2\n").count, 14);
        let (count, err) = writer.write(b"line 3\nline 4").into_parts();
        assert_eq!(count, 0);
        assert!(err.is_some());
        assert_eq!(writer.buffered(), b" 1\nline 2\n");
        assert_eq!(writer.final_newline, expected_newline(&writer));
        assert_eq!(
            writer.final_newline.map(|idx| idx - writer.storage.offset()),
            Some(9)
        );
        assert_eq!(sink_output(&writer), b"line");
    }

    #[test]
    fn slide_shifts_tracked_newline() {
        let mut writer = capped(usize::MAX, 1024);
        assert!(writer.write(&[b'x'; 40]).is_ok());
        assert!(writer.write(b"abc\n").is_ok());
        writer.storage.consume(40);
        writer.final_newline = writer.storage.last_newline();
        let capacity = writer.storage.capacity();
        assert!(writer.write(&[b'y'; 25]).is_ok());
        assert_eq!(writer.storage.capacity(), capacity, "slide must reuse the allocation");
        assert_eq!(writer.storage.offset(), 0);
        assert_eq!(writer.final_newline, Some(3));
        assert_eq!(writer.final_newline, expected_newline(&writer));
    }

    #[test]
    fn invalid_write_leaves_buffer_untouched() {
        struct Inflating;
        impl ByteSink for Inflating {
            fn write_bytes(&mut self, buf: &[u8]) -> Progress {
                Progress::done(buf.len() * 2)
            }
            fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let mut writer = BatchLineWriter::new(Inflating, 2).unwrap();
        let (count, err) = writer.write(b"ab\n").into_parts();
        assert_eq!(count, 0);
        assert!(matches!(err, Some(LineError::InvalidWrite { .. })));
        assert_eq!(writer.buffered(), b"ab\n");
        assert_eq!(writer.final_newline, Some(2));
    }

    #[test]
    #[traced_test]
    fn partial_flush_and_unclosed_drop_are_logged() {
        let mut writer = capped(2, 4);
        assert!(writer.write(b"abc\n").error.is_some());
        assert!(logs_contain("partial flush"));
        drop(writer);
        assert!(logs_contain("dropped without close"));
    }

    proptest! {
        /// 任意 `write` / `transfer_from` 交替序列、任意阈值与任意部分写上限下，
        /// 换行跟踪始终与实际存活区一致，返回计数只统计本次新数据中真正送达的字节。
        ///
        /// 每个数据块都短于读取块，`transfer_from` 恰好读取一轮，因此两条路径的记账规则相同。
        #[test]
        fn final_newline_matches_live_region(
            threshold in 1usize..48,
            limit in prop_oneof![Just(usize::MAX), 0usize..24],
            writes in prop::collection::vec(
                (
                    any::<bool>(),
                    prop::collection::vec(prop_oneof![Just(b'a'), Just(b'\n'), Just(b'z')], 0..40),
                ),
                0..24,
            ),
        ) {
            let mut writer = capped(limit, threshold);
            for (via_transfer, data) in &writes {
                let before = writer.buffered().to_vec();
                let sent_before = sink_output(&writer).len();
                let (count, err) = if *via_transfer {
                    let (total, err) = writer.transfer_from(&mut data.as_slice()).into_parts();
                    (usize::try_from(total).expect("chunk fits in usize"), err)
                } else {
                    writer.write(data).into_parts()
                };
                prop_assert_eq!(writer.final_newline, expected_newline(&writer));
                prop_assert!(count <= data.len());

                let sent = sink_output(&writer).len() - sent_before;
                match err {
                    None => {
                        prop_assert_eq!(count, data.len());
                        let mut stream = before.clone();
                        stream.extend_from_slice(data);
                        prop_assert_eq!(&stream[sent..], writer.buffered());
                        if sent > 0 {
                            prop_assert!(stream.len() >= threshold);
                            prop_assert_eq!(stream[sent - 1], b'\n');
                            prop_assert!(!writer.buffered().contains(&b'\n'));
                        }
                    }
                    Some(_) => {
                        prop_assert_eq!(count, sent.saturating_sub(before.len()));
                        if sent >= before.len() {
                            prop_assert_eq!(writer.buffered(), &data[count..]);
                        } else {
                            prop_assert_eq!(writer.buffered(), &before[sent..]);
                        }
                    }
                }
            }
        }
    }
}
