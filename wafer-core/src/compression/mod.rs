pub mod binary_quant;
pub mod bitpack;

pub use binary_quant::{BinaryQuantizer, SCORE_CORRECTION};
pub use bitpack::{pack, required_bytes, unpack, xor_bit_count};
