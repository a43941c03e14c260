pub mod admin;
pub mod health;
pub mod init;
pub mod serve;
