pub mod chat;
pub mod collections;
pub mod health;
pub mod index;
mod utils;
