use bytes::{Buf, BufMut, IntoBuf};

pub const STARTING_HASH: u32 = 5381;

#[inline]
pub fn pack_u32(buf: &mut [u8], x: u32) {
    let mut w = &mut buf[..4];
    w.put_u32_le(x);
}

#[inline]
pub fn unpack_u32(buf: &[u8]) -> u32 {
    buf[..4].into_buf().get_u32_le()
}

// h = 5381; h = ((h << 5) + h) ^ byte, wrapping mod 2^32.
#[inline]
pub fn hash(bytes: &[u8]) -> u32 {
    let mut h = STARTING_HASH;
    for b in bytes {
        h = h.wrapping_shl(5).wrapping_add(h) ^ (*b as u32);
    }
    h
}

#[inline]
pub fn bucket_of(h: u32) -> usize {
    (h & 0xFF) as usize
}

#[inline]
pub fn initial_slot(h: u32, num_slots: u32) -> u32 {
    (h >> 8) % num_slots
}
