//! Word conversion and bulk copy engine
//!
//! Provides the single-word converter, the strided `copy_words` routine with
//! its fast paths, and bit-level copies for sub-byte data.

pub mod word;
pub mod copy;
pub mod bits;
mod simd;

pub use word::{convert_word, Word};
pub use copy::{copy_words, copy_words_generic, span_len, store_value, word_components};
pub use bits::copy_bits;
