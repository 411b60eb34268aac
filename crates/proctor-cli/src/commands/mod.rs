pub mod config;
pub mod helpers;
pub mod logs;
pub mod run;
pub mod status;
