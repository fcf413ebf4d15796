#![allow(non_snake_case)]

mod mocks;
mod tests_nonce_tracker;
