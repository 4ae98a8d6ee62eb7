//! 与行相关的小工具。

use std::borrow::Cow;
use std::io;

use memchr::memchr_iter;

use crate::error::{LineError, Result};

const COUNT_BUFFER_SIZE: usize = 4096;

/// 统计 `reader` 中的行数，直到 EOF。
///
/// - 末尾不以换行结尾的残行也计为一行，因此 `"a\nb"` 与 `"a\nb\n"` 都是两行；
/// - 恰好只有一个字节 `\n` 的流计为 0 行；
/// - EOF 不是错误；其他读取错误以 [`LineError::Read`] 返回，已统计的部分随之丢弃。
pub fn count_lines<R: io::Read>(mut reader: R) -> Result<usize> {
    let mut buf = [0u8; COUNT_BUFFER_SIZE];
    let mut newlines = 0usize;
    let mut total = 0usize;
    let mut unterminated = false;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(LineError::Read(err)),
        };
        total += n;
        unterminated = buf[n - 1] != b'\n';
        newlines += memchr_iter(b'\n', &buf[..n]).count();
    }

    if unterminated {
        newlines += 1;
    } else if total == 1 {
        newlines -= 1;
    }
    Ok(newlines)
}

/// 返回恰好以一个 `\n` 结尾的字符串。
///
/// 末尾有多个换行时借用原串并截去多余部分；缺少换行时分配新串追加一个。
/// 空串与全由换行组成的串都返回 `"\n"`。
///
/// ```
/// use lineflow::one_newline;
///
/// assert_eq!(one_newline("abc"), "abc\n");
/// assert_eq!(one_newline("abc\n\n\n"), "abc\n");
/// assert_eq!(one_newline(""), "\n");
/// ```
pub fn one_newline(s: &str) -> Cow<'_, str> {
    let body = s.trim_end_matches('\n');
    if body.is_empty() {
        return Cow::Borrowed("\n");
    }
    if body.len() < s.len() {
        return Cow::Borrowed(&s[..body.len() + 1]);
    }
    let mut owned = String::with_capacity(s.len() + 1);
    owned.push_str(s);
    owned.push('\n');
    Cow::Owned(owned)
}
