//! 带“已消费前缀”的可增长字节缓冲。
//!
//! # 模块定位（Why）
//! - 两种行写入器都需要“尾部追加、头部消费”的缓冲：刷写只推进偏移量，避免每次都把剩余字节搬回头部；
//! - 搬移与扩容的时机集中在 [`LineBuffer::grow`]，写入器只需关心返回的插入位置与位移量。
//!
//! # 结构（How）
//! - `buf[..off]` 为已消费前缀，逻辑上已不存在；`buf[off..]` 为存活区；
//! - `grow` 依次尝试：空存活区时归零偏移、容量内原地延长、首次小分配、半容量以内滑动、翻倍重分配。
//!
//! # 契约（What）
//! - 除“容量内原地延长”外，`grow` 返回时 `off == 0`，并通过 [`Reserved::shifted`] 告知绝对下标整体左移了多少；
//! - 任何调用方持有的绝对下标（例如最后一个换行的位置）都必须减去 `shifted`。

use memchr::memrchr;

/// 首次分配的最小容量。
pub(crate) const SMALL_BUFFER_SIZE: usize = 64;

/// [`LineBuffer::grow`] 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reserved {
    /// 新字节的起始绝对下标。
    pub(crate) at: usize,
    /// 本次调用中绝对下标整体左移的字节数。
    pub(crate) shifted: usize,
}

#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    off: usize,
}

impl LineBuffer {
    /// 存活区长度。
    pub(crate) fn len(&self) -> usize {
        self.buf.len() - self.off
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 存活区起点的绝对下标。
    pub(crate) fn offset(&self) -> usize {
        self.off
    }

    /// 存活区终点（不含）的绝对下标。
    pub(crate) fn end(&self) -> usize {
        self.buf.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub(crate) fn live(&self) -> &[u8] {
        &self.buf[self.off..]
    }

    /// 存活区中 `[off, end)` 的部分。
    pub(crate) fn live_to(&self, end: usize) -> &[u8] {
        &self.buf[self.off..end]
    }

    /// 任意绝对区间。
    pub(crate) fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.buf[start..end]
    }

    pub(crate) fn slice_mut(&mut self, start: usize, end: usize) -> &mut [u8] {
        &mut self.buf[start..end]
    }

    /// 存活区中最后一个 `\n` 的绝对下标。
    pub(crate) fn last_newline(&self) -> Option<usize> {
        memrchr(b'\n', self.live()).map(|idx| idx + self.off)
    }

    /// 消费存活区头部 `n` 字节。
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len(), "consume past end of live region");
        self.off += n;
    }

    /// 把存活区截断为 `[off, end)`。
    pub(crate) fn truncate_to(&mut self, end: usize) {
        debug_assert!(end >= self.off, "truncate before live region");
        self.buf.truncate(end);
    }

    /// 清空内容但保留已分配的容量。
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.off = 0;
    }

    /// 清空内容并归还内存。
    pub(crate) fn release(&mut self) {
        self.buf = Vec::new();
        self.off = 0;
    }

    /// 追加 `data`，返回其起始绝对下标与位移量。
    pub(crate) fn append(&mut self, data: &[u8]) -> Reserved {
        let reserved = self.grow(data.len());
        self.buf[reserved.at..reserved.at + data.len()].copy_from_slice(data);
        reserved
    }

    /// 保证尾部至少还能放下 `n` 字节，并把存活区延长 `n` 字节（新字节内容未定义）。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：追加路径与“从 source 直接读入尾部”的路径共用同一套扩容策略；
    /// - **逻辑 (How)**：
    ///   1. 存活区为空而偏移非零时先归零，尽量复用现有容量；
    ///   2. 容量足够则原地延长，这是唯一可能保留非零偏移的出口；
    ///   3. 尚未分配且 `n` 不超过 [`SMALL_BUFFER_SIZE`] 时分配小缓冲；
    ///   4. 需要的总长度不超过容量一半时，把存活区滑回头部，摊销搬移成本；
    ///   5. 否则分配 `2 * capacity + n` 的新缓冲并复制存活区；
    /// - **契约 (What)**：返回的 `at` 之后 `n` 字节属于调用方；`shifted` 为绝对下标的整体左移量。
    /// - **风险 (Trade-offs)**：新容量溢出 `usize` 时直接 panic，这只会出现在逼近地址空间上限的病态调用中。
    pub(crate) fn grow(&mut self, n: usize) -> Reserved {
        let mut shifted = 0;
        let live = self.len();
        if live == 0 && self.off != 0 {
            shifted = self.off;
            self.reset();
        }

        let Some(extended) = self.buf.len().checked_add(n) else {
            too_large()
        };
        if extended <= self.buf.capacity() {
            let at = self.buf.len();
            self.buf.resize(extended, 0);
            return Reserved { at, shifted };
        }

        if self.buf.capacity() == 0 && n <= SMALL_BUFFER_SIZE {
            self.buf = Vec::with_capacity(SMALL_BUFFER_SIZE);
            self.buf.resize(n, 0);
            return Reserved { at: 0, shifted };
        }

        let Some(needed) = live.checked_add(n) else {
            too_large()
        };
        let cap = self.buf.capacity();
        if needed <= cap / 2 {
            tracing::trace!(live, needed, cap, "sliding live region to front");
            self.buf.copy_within(self.off.., 0);
            self.buf.truncate(live);
        } else {
            let Some(next_cap) = cap.checked_mul(2).and_then(|doubled| doubled.checked_add(n))
            else {
                too_large()
            };
            tracing::trace!(live, needed, cap, next_cap, "reallocating line buffer");
            let mut next = Vec::with_capacity(next_cap);
            next.extend_from_slice(&self.buf[self.off..]);
            self.buf = next;
        }
        shifted += self.off;
        self.off = 0;
        self.buf.resize(needed, 0);
        Reserved { at: live, shifted }
    }
}

#[cold]
fn too_large() -> ! {
    panic!("lineflow::LineBuffer: too large")
}
