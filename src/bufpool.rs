//! Process-wide buffer pools for scanner reads and debug formatting
//!
//! Buffers are handed out as guards that return their allocation to the
//! pool on drop, so release happens on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

const MAX_POOLED: usize = 16;

static BYTE_POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
static STRING_POOL: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// A pooled byte buffer, returned to the pool on drop.
pub struct PooledBuf {
    buf: Vec<u8>,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let mut pool = BYTE_POOL.lock().expect("byte pool poisoned");
        if pool.len() < MAX_POOLED {
            pool.push(std::mem::take(&mut self.buf));
        }
    }
}

/// Take a byte buffer of at least `capacity` bytes from the pool, resized
/// and zero-filled to exactly `capacity`.
pub fn get_buf(capacity: usize) -> PooledBuf {
    let mut buf = BYTE_POOL
        .lock()
        .expect("byte pool poisoned")
        .pop()
        .unwrap_or_default();
    buf.clear();
    buf.resize(capacity, 0);
    PooledBuf { buf }
}

/// A pooled scratch string, returned to the pool on drop.
pub struct PooledString {
    s: String,
}

impl Deref for PooledString {
    type Target = String;

    fn deref(&self) -> &String {
        &self.s
    }
}

impl DerefMut for PooledString {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.s
    }
}

impl Drop for PooledString {
    fn drop(&mut self) {
        let mut pool = STRING_POOL.lock().expect("string pool poisoned");
        if pool.len() < MAX_POOLED {
            let mut s = std::mem::take(&mut self.s);
            s.clear();
            pool.push(s);
        }
    }
}

/// Take an empty scratch string from the pool.
pub fn get_string() -> PooledString {
    let s = STRING_POOL
        .lock()
        .expect("string pool poisoned")
        .pop()
        .unwrap_or_default();
    PooledString { s }
}
