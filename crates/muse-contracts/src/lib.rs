pub mod campaign;
pub mod events;
pub mod manifest;
pub mod models;
