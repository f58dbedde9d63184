pub mod config;
pub mod controller;
pub mod emulator;
pub mod error;
pub mod intake;
pub mod protocol;
pub mod report;
