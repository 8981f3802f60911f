//! Integration tests: full scan → evaluate → sell cycles against an
//! in-memory chain.

mod lifecycle;
mod mock_chain;
