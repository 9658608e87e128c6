//! Memory arena backing the working set.
//!
//! A private anonymous `mmap` with `MAP_POPULATE`, so every page is resident
//! before the first timed pass and no first-touch fault lands inside a counter
//! window. The mapping is zero-filled by the kernel.
use crate::error::{Error, Result};
use log::{debug, warn};
use std::fmt::Write;
use std::io;
use std::ptr;
use std::slice;

/// Exclusively owned, pre-faulted byte region
pub struct Arena {
    ptr: *mut u8,
    len: usize,
}

impl Arena {
    /// Map `len` bytes of zeroed, populated memory.
    ///
    /// A zero-length request fails like any other rejected mapping. There is no
    /// retry and no smaller fallback.
    pub fn allocate(len: usize) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_POPULATE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::Allocation {
                size: len,
                source: io::Error::last_os_error(),
            });
        }

        debug!("Mapped {len} byte arena at {ptr:p}");
        Ok(Arena {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Hex + ASCII dump of the first `len` bytes, `line_len` bytes per line with
    /// an extra gap every `split` bytes.
    pub fn hexdump(&self, len: usize, line_len: usize, split: usize) -> String {
        hexdump(&self.as_slice()[..len.min(self.len)], line_len, split)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// Ask the kernel to place future allocations of this thread on its current
/// NUMA node. Advisory: failure only produces a warning.
pub fn prefer_local_node() {
    let rc = unsafe {
        libc::syscall(
            libc::SYS_set_mempolicy,
            libc::MPOL_LOCAL,
            ptr::null::<libc::c_ulong>(),
            0 as libc::c_ulong,
        )
    };
    if rc != 0 {
        warn!(
            "Couldn't set local NUMA allocation policy: {}",
            io::Error::last_os_error()
        );
    }
}

fn hexdump(data: &[u8], line_len: usize, split: usize) -> String {
    let line_len = line_len.max(1);
    let split = split.max(1);
    let mut out = String::new();

    for line in data.chunks(line_len) {
        for pos in 0..line_len {
            if pos > 0 && pos % split == 0 {
                out.push_str("  ");
            }
            match line.get(pos) {
                Some(byte) => {
                    let _ = write!(out, "{byte:02x} ");
                }
                None => out.push_str("   "),
            }
        }

        out.push_str("  ");

        for (pos, &byte) in line.iter().enumerate() {
            if pos > 0 && pos % split == 0 {
                out.push_str("  ");
            }
            out.push(if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_zeroed() {
        let arena = Arena::allocate(64 * 1024).unwrap();
        assert_eq!(arena.len(), 64 * 1024);
        assert!(arena.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn mapping_is_writable() {
        let mut arena = Arena::allocate(8192).unwrap();
        arena.as_mut_slice().fill(0x42);
        assert!(arena.as_slice().iter().all(|&b| b == 0x42));
    }

    #[test]
    fn zero_length_is_allocation_error() {
        assert!(matches!(
            Arena::allocate(0),
            Err(Error::Allocation { size: 0, .. })
        ));
    }

    #[test]
    fn hexdump_layout() {
        let data: Vec<u8> = (0x40..0x50).collect();
        let dump = hexdump(&data, 16, 8);
        assert_eq!(
            dump,
            "40 41 42 43 44 45 46 47   48 49 4a 4b 4c 4d 4e 4f   @ABCDEFG  HIJKLMNO\n"
        );
    }

    #[test]
    fn hexdump_pads_short_line() {
        let dump = hexdump(&[0x00, 0x7f, b'a'], 4, 4);
        assert_eq!(dump, "00 7f 61      ..a\n");
    }

    #[test]
    fn arena_hexdump_is_bounded() {
        let arena = Arena::allocate(4096).unwrap();
        assert_eq!(arena.hexdump(32, 16, 8).lines().count(), 2);
        assert_eq!(arena.hexdump(1 << 20, 16, 8).lines().count(), 256);
    }

    #[test]
    fn local_policy_then_allocate() {
        prefer_local_node();
        let mut arena = Arena::allocate(1 << 20).unwrap();
        arena.as_mut_slice()[..4096].fill(1);
        assert_eq!(arena.as_slice()[4095], 1);
    }
}
