#![recursion_limit = "256"]

pub mod checkpoint;
pub mod data;
pub mod model;
pub mod schedule;
pub mod training;
pub mod utils;
