use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::model::payment_entry::EntryType;

/// Inputs of a monthly payroll record that feed the net salary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PayComponents {
    pub salary: f64,
    pub certificate_percentage: f64,
    pub risk_percentage: f64,
    pub manage_percentage: f64,
    pub retire_percentage: f64,
    pub trans_pay: f64,
    pub kids_pay: f64,
    pub marriage_pay: f64,
}

/// A single ad hoc credit or debit attached to a payment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerLine {
    pub entry_type: EntryType,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SalaryBreakdown {
    pub certificate_pay: f64,
    pub risk_pay: f64,
    pub manage_pay: f64,
    pub retire_cut: f64,
    pub ledger_credits: f64,
    pub ledger_debits: f64,
    pub total_credits: f64,
    pub total_debits: f64,
    pub net_salary: f64,
}

pub fn percent_of(amount: f64, percentage: f64) -> f64 {
    amount * percentage / 100.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn validate_percentage(field: &str, value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ApiError::validation(format!(
            "{field} must be between 0 and 100"
        )));
    }
    Ok(())
}

pub fn validate_non_negative(field: &str, value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::validation(format!("{field} must not be negative")));
    }
    Ok(())
}

impl PayComponents {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !self.salary.is_finite() || self.salary <= 0.0 {
            return Err(ApiError::validation("salary must be greater than 0"));
        }

        validate_percentage("certificate_percentage", self.certificate_percentage)?;
        validate_percentage("risk_percentage", self.risk_percentage)?;
        validate_percentage("manage_percentage", self.manage_percentage)?;
        validate_percentage("retire_percentage", self.retire_percentage)?;

        validate_non_negative("trans_pay", self.trans_pay)?;
        validate_non_negative("kids_pay", self.kids_pay)?;
        validate_non_negative("marriage_pay", self.marriage_pay)?;

        Ok(())
    }
}

impl SalaryBreakdown {
    pub fn compute<I>(components: &PayComponents, lines: I) -> Self
    where
        I: IntoIterator<Item = LedgerLine>,
    {
        let (ledger_credits, ledger_debits) =
            lines
                .into_iter()
                .fold((0.0, 0.0), |(credits, debits), line| match line.entry_type {
                    EntryType::Credit => (credits + line.amount, debits),
                    EntryType::Debit => (credits, debits + line.amount),
                });

        let salary = components.salary;
        let certificate_pay = percent_of(salary, components.certificate_percentage);
        let risk_pay = percent_of(salary, components.risk_percentage);
        let manage_pay = percent_of(salary, components.manage_percentage);
        let retire_cut = percent_of(salary, components.retire_percentage);

        let total_credits = salary
            + certificate_pay
            + risk_pay
            + manage_pay
            + components.trans_pay
            + components.kids_pay
            + components.marriage_pay
            + ledger_credits;
        let total_debits = retire_cut + ledger_debits;

        Self {
            certificate_pay,
            risk_pay,
            manage_pay,
            retire_cut,
            ledger_credits,
            ledger_debits,
            total_credits,
            total_debits,
            net_salary: total_credits - total_debits,
        }
    }

    /// Same breakdown with every amount rounded to 2 decimals for output.
    pub fn rounded(&self) -> Self {
        Self {
            certificate_pay: round2(self.certificate_pay),
            risk_pay: round2(self.risk_pay),
            manage_pay: round2(self.manage_pay),
            retire_cut: round2(self.retire_cut),
            ledger_credits: round2(self.ledger_credits),
            ledger_debits: round2(self.ledger_debits),
            total_credits: round2(self.total_credits),
            total_debits: round2(self.total_debits),
            net_salary: round2(self.net_salary),
        }
    }
}

/// Column sums over a set of payroll rows (report footers).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct BreakdownTotals {
    pub count: usize,
    pub salary: f64,
    pub certificate_pay: f64,
    pub risk_pay: f64,
    pub manage_pay: f64,
    pub retire_cut: f64,
    pub total_credits: f64,
    pub total_debits: f64,
    pub net_salary: f64,
}

impl BreakdownTotals {
    pub fn add(&mut self, salary: f64, breakdown: &SalaryBreakdown) {
        self.count += 1;
        self.salary += salary;
        self.certificate_pay += breakdown.certificate_pay;
        self.risk_pay += breakdown.risk_pay;
        self.manage_pay += breakdown.manage_pay;
        self.retire_cut += breakdown.retire_cut;
        self.total_credits += breakdown.total_credits;
        self.total_debits += breakdown.total_debits;
        self.net_salary += breakdown.net_salary;
    }

    pub fn rounded(&self) -> Self {
        Self {
            count: self.count,
            salary: round2(self.salary),
            certificate_pay: round2(self.certificate_pay),
            risk_pay: round2(self.risk_pay),
            manage_pay: round2(self.manage_pay),
            retire_cut: round2(self.retire_cut),
            total_credits: round2(self.total_credits),
            total_debits: round2(self.total_debits),
            net_salary: round2(self.net_salary),
        }
    }
}

impl<'a> FromIterator<(f64, &'a SalaryBreakdown)> for BreakdownTotals {
    fn from_iter<T: IntoIterator<Item = (f64, &'a SalaryBreakdown)>>(iter: T) -> Self {
        let mut totals = BreakdownTotals::default();
        for (salary, breakdown) in iter {
            totals.add(salary, breakdown);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components() -> PayComponents {
        PayComponents {
            salary: 1000.0,
            certificate_percentage: 10.0,
            risk_percentage: 5.0,
            retire_percentage: 7.0,
            trans_pay: 50.0,
            ..Default::default()
        }
    }

    #[test]
    fn net_salary_without_ledger_entries() {
        let b = SalaryBreakdown::compute(&components(), []);

        assert_eq!(b.certificate_pay, 100.0);
        assert_eq!(b.risk_pay, 50.0);
        assert_eq!(b.retire_cut, 70.0);
        assert_eq!(b.total_credits, 1200.0);
        assert_eq!(b.total_debits, 70.0);
        assert_eq!(b.net_salary, 1130.0);
    }

    #[test]
    fn ledger_entries_are_split_by_type() {
        let lines = [
            LedgerLine { entry_type: EntryType::Credit, amount: 25.0 },
            LedgerLine { entry_type: EntryType::Debit, amount: 40.0 },
            LedgerLine { entry_type: EntryType::Credit, amount: 5.0 },
        ];
        let b = SalaryBreakdown::compute(&components(), lines);

        assert_eq!(b.ledger_credits, 30.0);
        assert_eq!(b.ledger_debits, 40.0);
        assert_eq!(b.total_credits, 1230.0);
        assert_eq!(b.total_debits, 110.0);
        assert_eq!(b.net_salary, 1120.0);
    }

    #[test]
    fn optional_allowances_are_credits() {
        let c = PayComponents {
            manage_percentage: 20.0,
            kids_pay: 10.0,
            marriage_pay: 15.0,
            ..components()
        };
        let b = SalaryBreakdown::compute(&c, []);

        assert_eq!(b.manage_pay, 200.0);
        assert_eq!(b.total_credits, 1425.0);
        assert_eq!(b.net_salary, 1355.0);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        let c = PayComponents {
            salary: 100.0,
            certificate_percentage: 33.333,
            ..Default::default()
        };
        let b = SalaryBreakdown::compute(&c, []).rounded();
        assert_eq!(b.certificate_pay, 33.33);
    }

    #[test]
    fn percentages_outside_range_are_rejected() {
        for bad in [-0.5, 100.01, f64::NAN] {
            let c = PayComponents { risk_percentage: bad, ..components() };
            let err = c.validate().unwrap_err();
            assert!(err.to_string().contains("risk_percentage"), "{err}");
        }

        let edge = PayComponents {
            certificate_percentage: 0.0,
            retire_percentage: 100.0,
            ..components()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn salary_must_be_positive() {
        let c = PayComponents { salary: 0.0, ..components() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn negative_allowance_is_rejected() {
        let c = PayComponents { trans_pay: -1.0, ..components() };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("trans_pay"));
    }

    #[test]
    fn totals_sum_columns() {
        let a = SalaryBreakdown::compute(&components(), []);
        let b = SalaryBreakdown::compute(&PayComponents { salary: 500.0, ..components() }, []);
        let totals: BreakdownTotals = [(1000.0, &a), (500.0, &b)].into_iter().collect();

        assert_eq!(totals.count, 2);
        assert_eq!(totals.salary, 1500.0);
        assert_eq!(totals.retire_cut, 105.0);
        assert_eq!(totals.net_salary, 1130.0 + 590.0);
    }
}
