//! Account credentials: password hashing and signed bearer tokens.

pub mod password;
pub mod token;

pub use password::{hash_password, unmatchable_hash, verify_password, DEFAULT_ITERATIONS};
pub use token::{Claims, TokenError, TokenIssuer, TokenPair, TokenType};
