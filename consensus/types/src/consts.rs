/// Number of intervals a slot is split into. Proposer boost is only granted to blocks that
/// arrive within the first interval.
pub const INTERVALS_PER_SLOT: u64 = 3;

pub const GENESIS_EPOCH: u64 = 0;

/// Index of the timely-target bit in a validator's participation flags.
pub const TIMELY_TARGET_FLAG_INDEX: usize = 1;

/// Number of epochs tracked by the justification bitfield.
pub const JUSTIFICATION_BITS_LENGTH: usize = 4;
