//! Integration tests: full trade runs against in-memory services.

mod mock_services;
mod trade_flow;
