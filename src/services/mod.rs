pub mod consensus;
pub mod evaluator;
pub mod judge;
pub mod queue;
