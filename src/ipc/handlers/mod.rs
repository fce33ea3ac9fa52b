pub mod assign;
pub mod clear;
pub mod core;
pub mod grid;
pub mod timeslots;
