//! # Cache geometry
//!
//! Reads the last-level cache capacity the kernel exposes through sysfs. The
//! descriptor is a single line holding a decimal count with an optional unit
//! letter: `K`, `M` or `G` (binary multiples). No fallback size is ever made up,
//! a missing or unreadable descriptor is fatal to the run.
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format_size;
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Capacity of the last-level cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    pub size_bytes: u64,
}

/// Detect the L3 capacity from the descriptor named in `config`
pub fn detect(config: &Config) -> Result<CacheGeometry> {
    let size_bytes = read_descriptor(&config.descriptor_path).map_err(|source| Error::Detection {
        path: config.descriptor_path.clone(),
        source,
    })?;

    info!(
        "Detected L3 cache size: {} bytes ({})",
        size_bytes,
        format_size(size_bytes as f32)
    );
    Ok(CacheGeometry { size_bytes })
}

fn read_descriptor(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "cache size descriptor is empty",
        ));
    }
    parse_size_descriptor(&line)
}

/// Parse a capacity descriptor such as `"32768K\n"` into bytes.
///
/// A single trailing newline is stripped, then a trailing `K`/`M`/`G` selects a
/// multiplier of 1024, 1024² or 1024³. Without a unit the whole line is the byte
/// count.
pub fn parse_size_descriptor(line: &str) -> io::Result<u64> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let (digits, multiplier) = match line.as_bytes().last() {
        Some(b'K') => (&line[..line.len() - 1], 1024),
        Some(b'M') => (&line[..line.len() - 1], 1024 * 1024),
        Some(b'G') => (&line[..line.len() - 1], 1024 * 1024 * 1024),
        _ => (line, 1),
    };

    let value: u64 = digits.parse().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed cache size '{line}': {e}"),
        )
    })?;

    value.checked_mul(multiplier).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cache size '{line}' overflows"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_suffixes() {
        assert_eq!(parse_size_descriptor("512\n").unwrap(), 512);
        assert_eq!(parse_size_descriptor("8192K\n").unwrap(), 8 * 1024 * 1024);
        assert_eq!(parse_size_descriptor("32M\n").unwrap(), 32 * 1024 * 1024);
        assert_eq!(parse_size_descriptor("1G\n").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn newline_is_optional() {
        assert_eq!(parse_size_descriptor("16M").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_size_descriptor("0").unwrap(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size_descriptor("\n").is_err());
        assert!(parse_size_descriptor("K\n").is_err());
        assert!(parse_size_descriptor("12 MB\n").is_err());
        assert!(parse_size_descriptor("-4K\n").is_err());
    }

    #[test]
    fn missing_descriptor_is_detection_error() {
        let config = Config {
            descriptor_path: "/nonexistent/cache/index3/size".into(),
            ..Config::default()
        };
        assert!(matches!(detect(&config), Err(Error::Detection { .. })));
    }
}
