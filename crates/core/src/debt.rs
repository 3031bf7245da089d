use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::Money;

/// Upper bound on simulated months (30 years).
pub const MAX_PAYOFF_MONTHS: u32 = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebtAccountId(pub i64);

impl fmt::Display for DebtAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtAccount {
    pub id: Option<DebtAccountId>,
    pub name: String,
    pub balance: Money,
    /// Annual percentage rate, e.g. `19.99` for 19.99%.
    pub apr: Option<Decimal>,
    pub min_payment: Option<Money>,
    pub due_day: Option<u8>,
    pub active: bool,
}

impl DebtAccount {
    pub fn new(name: &str, balance: Money) -> Self {
        DebtAccount {
            id: None,
            name: name.to_string(),
            balance,
            apr: None,
            min_payment: None,
            due_day: None,
            active: true,
        }
    }

    pub fn with_apr(mut self, apr: Decimal) -> Self {
        self.apr = Some(apr);
        self
    }

    pub fn with_min_payment(mut self, min_payment: Money) -> Self {
        self.min_payment = Some(min_payment);
        self
    }

    fn apr_or_zero(&self) -> Decimal {
        self.apr.unwrap_or(Decimal::ZERO)
    }

    fn monthly_interest(&self) -> Money {
        let rate = self.apr_or_zero() / Decimal::from(1200);
        Money::from_decimal(self.balance.as_decimal() * rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoffStrategy {
    /// Highest APR first.
    #[default]
    Avalanche,
    /// Smallest balance first.
    Snowball,
}

impl PayoffStrategy {
    pub fn note(self) -> &'static str {
        match self {
            PayoffStrategy::Avalanche => "Avalanche: highest APR first, pay minimums on the rest.",
            PayoffStrategy::Snowball => "Snowball: smallest balance first for faster wins.",
        }
    }

    fn sort(self, debts: &mut [DebtAccount]) {
        match self {
            PayoffStrategy::Avalanche => debts.sort_by(|a, b| b.apr_or_zero().cmp(&a.apr_or_zero())),
            PayoffStrategy::Snowball => debts.sort_by(|a, b| a.balance.cmp(&b.balance)),
        }
    }
}

impl FromStr for PayoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "avalanche" => Ok(PayoffStrategy::Avalanche),
            "snowball" => Ok(PayoffStrategy::Snowball),
            other => Err(format!("Unknown payoff strategy: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffRecommendation {
    pub ordered: Vec<DebtAccount>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffProjection {
    pub months: u32,
    /// True when the simulation hit [`MAX_PAYOFF_MONTHS`] with debt remaining.
    pub capped: bool,
    pub total_interest: Money,
    /// Balances after the final simulated month, in payoff order.
    pub ordered: Vec<DebtAccount>,
}

/// Orders the active debts by the chosen strategy.
pub fn sort_debts(debts: &[DebtAccount], strategy: PayoffStrategy) -> PayoffRecommendation {
    let mut ordered: Vec<DebtAccount> = debts.iter().filter(|d| d.active).cloned().collect();
    strategy.sort(&mut ordered);
    PayoffRecommendation {
        ordered,
        note: strategy.note().to_string(),
    }
}

/// Month-by-month simulation: every debt accrues interest and receives its
/// minimum, then `extra_per_month` goes to the first debt in the order that
/// still has a balance, spilling over to the next once that one is cleared.
/// The order is re-evaluated after each month.
pub fn project_payoff(
    debts: &[DebtAccount],
    extra_per_month: Money,
    strategy: PayoffStrategy,
) -> PayoffProjection {
    let mut working = sort_debts(debts, strategy).ordered;

    let min_sum: Money = working.iter().filter_map(|d| d.min_payment).sum();
    if !(min_sum + extra_per_month).is_positive() {
        return PayoffProjection {
            months: 0,
            capped: false,
            total_interest: Money::zero(),
            ordered: working,
        };
    }

    let mut months = 0;
    let mut total_interest = Money::zero();
    while working.iter().any(|d| d.balance.is_positive()) && months < MAX_PAYOFF_MONTHS {
        months += 1;
        for debt in working.iter_mut().filter(|d| d.balance.is_positive()) {
            let interest = debt.monthly_interest();
            total_interest += interest;
            let minimum = debt.min_payment.unwrap_or_default();
            debt.balance = (debt.balance + interest - minimum).max(Money::zero());
        }

        let mut extra = extra_per_month;
        for debt in working.iter_mut().filter(|d| d.balance.is_positive()) {
            if !extra.is_positive() {
                break;
            }
            let paid = extra.min(debt.balance);
            debt.balance = debt.balance - paid;
            extra = extra - paid;
        }
        strategy.sort(&mut working);
    }

    let capped = working.iter().any(|d| d.balance.is_positive());
    PayoffProjection {
        months,
        capped,
        total_interest,
        ordered: working,
    }
}
