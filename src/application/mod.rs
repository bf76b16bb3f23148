pub mod config;
pub mod locks;
pub mod rpc;
