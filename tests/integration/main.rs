//! Integration tests: full rebalancing passes against in-memory
//! collaborators.

mod mock_exchange;
mod rebalance_pass;
