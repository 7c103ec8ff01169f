// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
bit packing, so a pair of sizes fits in one atomic.
*/

pub fn u64_to_u32s(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, (packed & 0xFFFF_FFFF) as u32)
}

pub fn u32s_to_u64(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | (low as u64)
}
