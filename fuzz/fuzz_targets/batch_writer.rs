#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lineflow::{BatchLineWriter, ByteSink, DEFAULT_READ_CHUNK, LineError, Progress};
use std::cell::RefCell;
use std::rc::Rc;

/// Fuzz 输入：阈值、sink 单次接受上限与操作序列。
///
/// - **Why**：部分写记账只在“旧缓冲 + 新数据”混合刷写时出现，手写用例难以覆盖所有切分方式；
/// - **How**：[`Model`] 独立复现刷写判定与部分写记账，每次操作后比对返回值、存活区与 sink 收到的字节；
/// - **What**：任一操作后模型与实现不一致、计数越界或 panic 都视为缺陷。
#[derive(Debug, Arbitrary)]
struct WriterCase {
    threshold: u8,
    accept_limit: Option<u8>,
    ops: Vec<WriterOp>,
}

#[derive(Debug, Arbitrary)]
enum WriterOp {
    Write(Vec<u8>),
    Transfer(Vec<Vec<u8>>),
    FlushLines,
    Close,
}

/// 记录全部已接受字节的 sink，单次最多接受 `limit` 字节。
struct SharedSink {
    out: Rc<RefCell<Vec<u8>>>,
    limit: Option<usize>,
}

impl ByteSink for SharedSink {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        let accepted = self.limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.out.borrow_mut().extend_from_slice(&buf[..accepted]);
        if accepted < buf.len() {
            return Progress::failed(
                accepted,
                LineError::ShortWrite {
                    requested: buf.len(),
                    accepted,
                },
            );
        }
        Progress::done(accepted)
    }

    fn close(&mut self) -> Result<(), LineError> {
        Ok(())
    }
}

/// 影子模型：存活区、sink 已接受的字节，以及与实现相同的刷写规则。
struct Model {
    live: Vec<u8>,
    sent: Vec<u8>,
    threshold: usize,
    limit: Option<usize>,
}

impl Model {
    /// 把 `[0, end)` 交给 sink；返回 `(本次新数据中送达的字节数, 是否出错)`。
    fn flush(&mut self, prior: usize, appended: usize, end: usize) -> (usize, bool) {
        let accepted = self.limit.map_or(end, |limit| limit.min(end));
        self.sent.extend_from_slice(&self.live[..accepted]);
        if accepted == end {
            self.live.drain(..accepted);
            return (appended, false);
        }
        if accepted >= prior {
            self.live.drain(..accepted);
            (accepted - prior, true)
        } else {
            self.live.truncate(prior);
            self.live.drain(..accepted);
            (0, true)
        }
    }

    fn ingest(&mut self, data: &[u8]) -> (usize, bool) {
        let prior = self.live.len();
        self.live.extend_from_slice(data);
        if self.live.len() < self.threshold {
            return (data.len(), false);
        }
        match self.live.iter().rposition(|&b| b == b'\n') {
            Some(idx) => self.flush(prior, data.len(), idx + 1),
            None => (data.len(), false),
        }
    }

    /// 按读取块切分 `stream`，最后一轮是 source 报告 EOF 的空读取。
    fn transfer(&mut self, stream: &[u8]) -> (u64, bool) {
        let mut total = 0u64;
        let eof: &[u8] = &[];
        for chunk in stream.chunks(DEFAULT_READ_CHUNK).chain([eof]) {
            let (count, failed) = self.ingest(chunk);
            if failed {
                return (total + count as u64, true);
            }
            total += chunk.len() as u64;
        }
        (total, false)
    }

    fn flush_lines(&mut self) -> bool {
        let prior = self.live.len();
        match self.live.iter().rposition(|&b| b == b'\n') {
            Some(idx) => !self.flush(prior, 0, idx + 1).1,
            None => true,
        }
    }

    fn close(&mut self) -> bool {
        let len = self.live.len();
        let accepted = self.limit.map_or(len, |limit| limit.min(len));
        self.sent.extend_from_slice(&self.live[..accepted]);
        self.live.clear();
        accepted == len
    }
}

fuzz_target!(|case: WriterCase| {
    let threshold = usize::from(case.threshold.max(1));
    let limit = case.accept_limit.map(usize::from);
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = SharedSink {
        out: Rc::clone(&out),
        limit,
    };
    let Ok(mut writer) = BatchLineWriter::new(sink, threshold) else {
        return;
    };
    let mut model = Model {
        live: Vec::new(),
        sent: Vec::new(),
        threshold,
        limit,
    };

    for op in case.ops {
        match op {
            WriterOp::Write(data) => {
                let (count, err) = writer.write(&data).into_parts();
                assert_eq!((count, err.is_some()), model.ingest(&data));
            }
            WriterOp::Transfer(chunks) => {
                let stream = chunks.concat();
                let mut source: &[u8] = &stream;
                let (total, err) = writer.transfer_from(&mut source).into_parts();
                assert_eq!((total, err.is_some()), model.transfer(&stream));
            }
            WriterOp::FlushLines => {
                assert_eq!(writer.flush_completed_lines().is_ok(), model.flush_lines());
            }
            WriterOp::Close => {
                assert_eq!(writer.close().is_ok(), model.close());
                assert!(writer.is_closed());
                assert_eq!(out.borrow().as_slice(), model.sent.as_slice());
                return;
            }
        }
        assert_eq!(writer.buffered(), model.live.as_slice());
        assert_eq!(out.borrow().as_slice(), model.sent.as_slice());
    }
});
