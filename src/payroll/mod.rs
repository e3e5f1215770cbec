//! Payroll arithmetic shared by every endpoint that shows a salary.

pub mod calc;
pub mod period;

pub use calc::{BreakdownTotals, LedgerLine, PayComponents, SalaryBreakdown};
