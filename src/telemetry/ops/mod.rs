pub mod init;
pub mod schedule;
pub mod fetch;
pub mod listen;
pub mod feed;
