pub mod instruments;
pub mod simulator;
