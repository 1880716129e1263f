//! Batch job that loads retail transactions into the warehouse.
//!
//! One run reads the transactions, product catalog and customer tables from the configured
//! source location, enriches the transactions, and replaces the two warehouse tables.

pub mod pipeline;
