//! 集成测试共享的 sink / source 替身。
//!
//! - [`RecordingSink`] 以 `Rc<RefCell<_>>` 共享内部状态，写入器拿走 sink 的所有权后，测试仍能观察写入与关闭；
//! - [`ScriptedSource`] 按脚本逐次返回数据块与流状态，用于驱动 `transfer_from` 的各条分支。
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use lineflow::{ByteSink, ByteSource, LineError, Progress, ReadOutcome};

/// sink 观察到的全部事件。
#[derive(Debug, Default)]
pub struct SinkLog {
    /// 每次 `write_bytes` 实际接受的字节。
    pub writes: Vec<Vec<u8>>,
    /// `close` 被调用的次数。
    pub closes: usize,
}

impl SinkLog {
    /// 所有已接受字节的拼接。
    pub fn output(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

/// 可配置失败方式的记录型 sink。
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Rc<RefCell<SinkLog>>,
    /// 每次写入至多接受的字节数；超出部分以 `ShortWrite` 报告。
    pub accept_limit: Option<usize>,
    /// 每次写入都失败并报告该错误类型（仍按 `accept_limit` 接受部分字节）。
    pub write_failure: Option<io::ErrorKind>,
    /// `close` 失败时报告的错误类型。
    pub close_failure: Option<io::ErrorKind>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepting(limit: usize) -> Self {
        Self {
            accept_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn failing_close(kind: io::ErrorKind) -> Self {
        Self {
            close_failure: Some(kind),
            ..Self::default()
        }
    }

    pub fn failing_writes(kind: io::ErrorKind) -> Self {
        Self {
            accept_limit: Some(0),
            write_failure: Some(kind),
            ..Self::default()
        }
    }

    /// 与写入器共享同一份日志的句柄。
    pub fn log(&self) -> Rc<RefCell<SinkLog>> {
        Rc::clone(&self.log)
    }
}

impl ByteSink for RecordingSink {
    fn write_bytes(&mut self, buf: &[u8]) -> Progress {
        let accepted = self.accept_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.log.borrow_mut().writes.push(buf[..accepted].to_vec());
        if let Some(kind) = self.write_failure {
            return Progress::failed(
                accepted,
                LineError::Write(io::Error::new(kind, "scripted write failure")),
            );
        }
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
        self.log.borrow_mut().closes += 1;
        match self.close_failure {
            Some(kind) => Err(LineError::Close(io::Error::new(kind, "scripted close failure"))),
            None => Ok(()),
        }
    }
}

/// 一步脚本的结尾状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open,
    Eof,
    Fail,
    /// 报告比缓冲更长的计数。
    Inflate,
}

/// 按脚本返回数据块的 source。
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: VecDeque<(Vec<u8>, Step)>,
    /// 已被调用的次数。
    pub reads: usize,
}

impl ScriptedSource {
    pub fn new<I, B>(steps: I) -> Self
    where
        I: IntoIterator<Item = (B, Step)>,
        B: AsRef<[u8]>,
    {
        Self {
            steps: steps
                .into_iter()
                .map(|(bytes, step)| (bytes.as_ref().to_vec(), step))
                .collect(),
            reads: 0,
        }
    }
}

impl ByteSource for ScriptedSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> ReadOutcome {
        self.reads += 1;
        let Some((bytes, step)) = self.steps.pop_front() else {
            return ReadOutcome::eof(0);
        };
        assert!(bytes.len() <= buf.len(), "script chunk larger than read buffer");
        buf[..bytes.len()].copy_from_slice(&bytes);
        match step {
            Step::Open => ReadOutcome::more(bytes.len()),
            Step::Eof => ReadOutcome::eof(bytes.len()),
            Step::Fail => ReadOutcome::failed(
                bytes.len(),
                LineError::Read(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "scripted read failure",
                )),
            ),
            Step::Inflate => ReadOutcome::more(buf.len() + 1),
        }
    }
}
