#![allow(dead_code)]

pub mod logging;
pub mod test_daemon;
