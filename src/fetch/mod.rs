// src/fetch/mod.rs

pub mod urls;
pub mod zips;
