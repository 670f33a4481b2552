pub mod calculator;
pub mod manager;

pub use calculator::{OrderCalculator, SizedOrder};
pub use manager::{MonitorExit, OrderManager, ReconcileReport};
