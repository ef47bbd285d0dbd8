//! Output buffer sizing shared by the encrypt and decrypt paths.

/// Resize `buf` to exactly `len` bytes.
///
/// The existing allocation is reused when its capacity is already large
/// enough; otherwise a new allocation of `len` bytes is made. The first
/// `min(buf.len(), len)` bytes are preserved. Anything past the old length is
/// zero-filled, and callers only rely on the first `len` bytes.
pub fn grow_buffer(mut buf: Vec<u8>, len: usize) -> Vec<u8> {
    if buf.capacity() < len {
        buf.reserve_exact(len - buf.len());
    }
    buf.resize(len, 0);
    buf
}
