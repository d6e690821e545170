pub mod aggregator;
pub mod dashboard;
pub mod demo;
pub mod supervisor;
pub mod terminal;
