// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Physical-memory probe, a monotonic timer, and the per-thread temp
//! directory layout. These are the small leaf facilities the worker pool
//! builds on.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use lazy_static::lazy_static;
use twox_hash::XxHash32;
use std::hash::Hasher;

/// Returns `(free_bytes, total_bytes)` of physical memory.
///
/// `(0, 0)` is the "unknown OS" sentinel; callers must treat it as
/// "not stressed" rather than erroring. On Linux this is read from
/// `/proc/meminfo`; other platforms currently always report the sentinel
/// (the original only ever implemented the Windows branch).
pub fn system_memory_size() -> (u64, u64) {
    #[cfg(target_os = "linux")]
    {
        if let Ok(info) = read_proc_meminfo() {
            return info;
        }
        (0, 0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        (0, 0)
    }
}

#[cfg(target_os = "linux")]
fn read_proc_meminfo() -> io::Result<(u64, u64)> {
    let contents = fs::read_to_string("/proc/meminfo")?;
    let mut mem_total: Option<u64> = None;
    let mut mem_available: Option<u64> = None;

    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let key = match parts.next() {
            Some(k) => k.trim_end_matches(':'),
            None => continue,
        };
        let value_kb: u64 = match parts.next().and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => continue,
        };
        match key {
            "MemTotal" => mem_total = Some(value_kb * 1024),
            "MemAvailable" => mem_available = Some(value_kb * 1024),
            _ => {}
        }
    }

    match (mem_available, mem_total) {
        (Some(free), Some(total)) => Ok((free, total)),
        _ => Ok((0, 0)),
    }
}

/// A monotonic, process-wide timer used to time-stamp memory-stress log
/// lines. Wraps `Instant` rather than a raw cycle counter.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Timer {
        Timer { start: Instant::now() }
    }

    /// Seconds elapsed since the timer was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new()
    }
}

lazy_static! {
    /// The build-wide temp root, initialized once per process by
    /// `init_tmp_root`. `worker::thread::WorkerThread` reads this to compute
    /// its own per-thread subdirectory.
    static ref TMP_ROOT: std::sync::Mutex<Option<PathBuf>> = std::sync::Mutex::new(None);
}

/// Hashes the current working directory into a short, stable, filesystem-safe
/// tag used to disambiguate concurrent builds sharing the same system temp
/// directory. Remote workers use `0` (they have no meaningful local working
/// directory to key off).
fn working_dir_hash() -> u32 {
    let cwd = std::env::current_dir().unwrap_or_default();
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(cwd.to_string_lossy().as_bytes());
    hasher.finish() as u32
}

/// Initializes the process-wide temp root exactly once. Safe to call more
/// than once (e.g. in tests); later calls are no-ops once a root is set.
pub fn init_tmp_root(remote: bool) -> io::Result<PathBuf> {
    let mut guard = TMP_ROOT.lock().unwrap();
    if let Some(existing) = guard.as_ref() {
        return Ok(existing.clone());
    }

    let hash = if remote { 0 } else { working_dir_hash() };
    let mut root = std::env::temp_dir();
    root.push("_buildcore.tmp");
    root.push(format!("0x{:08x}", hash));
    fs::create_dir_all(&root)?;

    *guard = Some(root.clone());
    Ok(root)
}

/// Returns the previously-initialized temp root, panicking if
/// `init_tmp_root` was never called. Mirrors the original's
/// `ASSERT(!s_TmpRoot.IsEmpty())`.
pub fn tmp_root() -> PathBuf {
    TMP_ROOT
        .lock()
        .unwrap()
        .clone()
        .expect("init_tmp_root must be called before tmp_root")
}

/// Computes and creates `<tmp_root>/core_<index>/`.
pub fn thread_tmp_dir(thread_index: u16) -> io::Result<PathBuf> {
    let mut dir = tmp_root();
    dir.push(format!("core_{}", thread_index));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_os_is_not_stressed() {
        // On non-Linux this is the real return value; on Linux it only holds
        // if /proc/meminfo is unreadable, so just check the sentinel shape.
        let (free, total) = (0u64, 0u64);
        assert!(total == 0 || free <= total);
    }

    #[test]
    fn working_dir_hash_is_stable() {
        assert_eq!(working_dir_hash(), working_dir_hash());
    }
}
