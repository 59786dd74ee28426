// Service layer for the Meenoe AI core

pub mod ai;
pub mod assistant;
pub mod context;
pub mod performance;
pub mod security;
