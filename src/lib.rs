pub mod authd;
pub mod cli;
pub mod session;
pub mod storage;
