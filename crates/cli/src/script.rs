//! Operation scripts: one device operation per line.
//!
//! ```text
//! # comment
//! unlock 0x0 4096
//! erase 0 4096
//! write 0x10 deadbeef
//! read 0x10 4
//! info
//! report
//! ```

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read { offset: u64, length: usize },
    Write { offset: u64, data: Vec<u8> },
    Unlock { start: u64, length: u64 },
    Erase { start: u64, length: u64 },
    Info,
    Report,
}

pub fn parse(text: &str) -> Result<Vec<Op>> {
    let mut ops = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = match raw.split_once('#') {
            Some((code, _)) => code.trim(),
            None => raw.trim(),
        };
        if line.is_empty() {
            continue;
        }
        let op = parse_line(line).with_context(|| format!("line {}: {:?}", n + 1, raw))?;
        ops.push(op);
    }
    Ok(ops)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<Op>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse(&text)
}

fn parse_line(line: &str) -> Result<Op> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let op = match words.as_slice() {
        ["read", offset, length] => Op::Read {
            offset: number(offset)?,
            length: usize::try_from(number(length)?)?,
        },
        ["write", offset, data] => Op::Write {
            offset: number(offset)?,
            data: hex::decode(data.trim_start_matches("0x")).context("Invalid hex data")?,
        },
        ["unlock", start, length] => Op::Unlock {
            start: number(start)?,
            length: number(length)?,
        },
        ["erase", start, length] => Op::Erase {
            start: number(start)?,
            length: number(length)?,
        },
        ["info"] => Op::Info,
        ["report"] => Op::Report,
        [cmd, ..] => bail!("Unknown or malformed operation: {}", cmd),
        [] => bail!("Empty operation"),
    };
    Ok(op)
}

/// Decimal, or hex with a `0x` prefix.
fn number(s: &str) -> Result<u64> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| anyhow!("Invalid number: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let ops = parse(
            "# wear test\n\
             unlock 0x1000 4096\n\
             erase 4096 0x1000   # again\n\
             \n\
             write 0x10 deadBEEF\n\
             read 16 4\n\
             info\n\
             report\n",
        )
        .unwrap();
        assert_eq!(
            ops,
            vec![
                Op::Unlock { start: 4096, length: 4096 },
                Op::Erase { start: 4096, length: 4096 },
                Op::Write { offset: 16, data: vec![0xde, 0xad, 0xbe, 0xef] },
                Op::Read { offset: 16, length: 4 },
                Op::Info,
                Op::Report,
            ]
        );
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = parse("info\nread 1\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
        assert!(parse("write 0 xyz").is_err());
        assert!(parse("erase 0 -1").is_err());
        assert!(parse("format 0 0").is_err());
    }
}
