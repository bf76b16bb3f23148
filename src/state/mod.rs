pub mod lock;
pub mod vault;
