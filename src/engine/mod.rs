//! Core engine: balance scan → candidate selection → order → settlement.

pub mod scanner;
pub mod prober;
pub mod slippage;
pub mod selector;
pub mod order_builder;
pub mod settlement;
pub mod trader;
