//! Rounding of the requested Queue-Capacities
//!
//! Both Queues round their Buffer-Length up to a power of two, which allows
//! them to reduce an Index with a simple Bit-Mask instead of a Division

/// Rounds the requested Capacity up to the next power of two, a Request of 0
/// is rounded up to 1
pub(crate) fn round_to_pow2(requested: usize) -> usize {
    requested.next_power_of_two()
}
