pub mod add;
pub mod auth_cmd;
pub mod common;
pub mod find;
pub mod list;
pub mod remove;
pub mod sync;
