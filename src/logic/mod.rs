//! Pure game rules: answer matching, score windows, and deck building.

pub mod matcher;
pub mod round_builder;
pub mod scoring;
