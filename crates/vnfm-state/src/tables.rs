//! redb table definitions for the record store.

use redb::TableDefinition;

/// Instance configurations keyed by VNF-record ID.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Deleted record IDs mapped to their deletion time (unix seconds).
pub const RETIRED: TableDefinition<&str, u64> = TableDefinition::new("retired");
