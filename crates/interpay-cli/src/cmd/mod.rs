pub mod config;
pub mod currencies;
pub mod demo;
