use alloy_primitives::FixedBytes;

pub type Hash256 = alloy_primitives::B256;

/// Constructors that `alloy_primitives` does not provide for fixed-size byte arrays.
pub trait FixedBytesExtended {
    /// Big-endian `value` in the trailing eight bytes, zero elsewhere.
    fn from_low_u64_be(value: u64) -> Self;
    fn zero() -> Self;
}

impl<const N: usize> FixedBytesExtended for FixedBytes<N> {
    fn from_low_u64_be(value: u64) -> Self {
        let mut buffer = [0u8; N];
        let value_bytes = value.to_be_bytes();
        let len = value_bytes.len().min(N);
        buffer[N - len..].copy_from_slice(&value_bytes[value_bytes.len() - len..]);
        Self::from(buffer)
    }

    fn zero() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_low_u64_be_orders_like_integers() {
        let one = Hash256::from_low_u64_be(1);
        let two = Hash256::from_low_u64_be(2);
        assert!(two > one, "byte-wise ordering should follow the integer");
        assert_eq!(one.as_slice()[31], 1);
        assert!(one.as_slice()[..31].iter().all(|byte| *byte == 0));
        assert_eq!(Hash256::from_low_u64_be(0), Hash256::zero());
    }
}
