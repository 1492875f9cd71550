pub mod chat;
pub mod health;
pub mod models;
pub mod nodes;
pub mod sessions;
pub mod stop;
pub mod stream;
