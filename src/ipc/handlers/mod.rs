pub mod admin;
pub mod core;
pub mod series;
