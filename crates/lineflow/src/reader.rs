//! 保证流以换行结尾的读取适配器。

use std::io;

/// 保证输出流以 `\n` 结尾的读取适配器。
///
/// 底层读取器到达 EOF 时，如果最后一个字节不是换行（包括空流），额外产出一个 `\n`，且只产出一次。
/// 常与 [`ReaderSource`](crate::ReaderSource) 组合，确保交给行写入器的最后一行也是完整行。
///
/// ```
/// use std::io::Read;
/// use lineflow::LineTerminatedReader;
///
/// let mut out = String::new();
/// LineTerminatedReader::new("a\nb".as_bytes())
///     .read_to_string(&mut out)
///     .unwrap();
/// assert_eq!(out, "a\nb\n");
/// ```
#[derive(Debug)]
pub struct LineTerminatedReader<R> {
    inner: R,
    terminated: bool,
}

impl<R: io::Read> LineTerminatedReader<R> {
    /// 包装底层读取器。
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            terminated: false,
        }
    }

    /// 取回底层读取器。
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read> io::Read for LineTerminatedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.terminated = buf[n - 1] == b'\n';
            return Ok(n);
        }
        if self.terminated {
            return Ok(0);
        }
        buf[0] = b'\n';
        self.terminated = true;
        Ok(1)
    }
}
