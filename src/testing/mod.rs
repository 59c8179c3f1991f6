//! Test doubles for the client and server seams.
pub mod mocks;
