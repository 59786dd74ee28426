// Data models for the Meenoe AI core

pub mod ai;
pub mod context;
