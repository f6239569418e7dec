pub mod audio;
pub mod config;
pub mod error;
pub mod guard;
pub mod net;
pub mod session;
pub mod speech;
pub mod talk;
pub mod transcript;

#[cfg(test)]
mod testing;
