//! Shared fakes and harness for bootstrapper integration tests.
#![allow(dead_code)]

pub mod fakes;
pub mod harness;
