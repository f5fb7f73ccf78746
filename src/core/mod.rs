pub mod config;
pub mod item;
pub mod script;
pub mod store;
pub mod terminal;
