pub mod cmd;
pub mod mount;
