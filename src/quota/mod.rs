pub mod authority;
pub mod ledger;
pub mod usage_file;

pub use authority::{BatchVerdict, LocalQuotaAuthority, QuotaAuthority, QuotaUsage, SessionGrant};
pub use ledger::{CostTable, QuotaLedger, QuotaOperation, QuotaSnapshot, SharedLedger};
pub use usage_file::QuotaUsageFile;
