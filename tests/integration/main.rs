//! Integration tests: full observation cycles over in-memory exchanges
//! and over the snapshot-backed DEX adapter.

mod cycle;
mod mock_exchange;
mod snapshot_pipeline;
