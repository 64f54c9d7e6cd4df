//! Data models for the lending ledger

pub mod dashboard;
pub mod item;
pub mod loan;
pub mod pagination;
pub mod user;

// Re-export commonly used types
pub use dashboard::{BorrowerDashboard, CatalogSummary, Dashboard, OperatorDashboard, OverdueBorrower};
pub use item::{Availability, CreateItem, Item, ItemQuery, UpdateItem};
pub use loan::{Loan, LoanDetails, LoanQuery, LoanStatus, LoanView};
pub use pagination::{Page, PageRequest, Paged};
pub use user::{Caller, CallerClaims, Role};
