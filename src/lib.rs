//! Universal machine interpreter.
//!
//! An interpreter for a fixed 14-operator instruction set over 32-bit
//! words: eight registers, a heap of independently sized word arrays, and
//! a byte-oriented input/output handshake. Hosts load a program image,
//! run the machine until it blocks on input, drain the produced bytes,
//! and feed input one byte at a time; a machine clones into a fully
//! independent snapshot so warm sessions can be forked instead of
//! replayed.

pub mod byteio;
pub mod machine;
pub mod utils;
