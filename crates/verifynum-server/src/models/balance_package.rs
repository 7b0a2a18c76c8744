//! Balance packages and the bonus tier schedule.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use serde::Serialize;

/// Package id recorded for free-form amounts.
pub const CUSTOM_PACKAGE_ID: &str = "custom";

/// One step of the bonus schedule: amounts at or above `min_amount`
/// earn `bonus_percent` extra credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusTier {
    pub min_amount: u32,
    pub bonus_percent: u32,
}

/// Bonus schedule, highest tier first.
pub const BONUS_TIERS: [BonusTier; 4] = [
    BonusTier {
        min_amount: 60,
        bonus_percent: 20,
    },
    BonusTier {
        min_amount: 30,
        bonus_percent: 15,
    },
    BonusTier {
        min_amount: 15,
        bonus_percent: 10,
    },
    BonusTier {
        min_amount: 5,
        bonus_percent: 5,
    },
];

/// Widest decimal exponent an incoming amount may carry, either way.
pub const MAX_AMOUNT_EXPONENT: i64 = 18;

/// Most significant digits an incoming amount may carry.
pub const MAX_AMOUNT_DIGITS: u64 = 32;

/// True when the amount's digits and exponent are small enough that
/// rescaling or comparing it costs next to nothing. `1e50000000` parses
/// cheaply but expands to fifty million digits on the first rescale.
pub fn is_bounded_amount(amount: &BigDecimal) -> bool {
    let (_, scale) = amount.as_bigint_and_exponent();
    (-MAX_AMOUNT_EXPONENT..=MAX_AMOUNT_EXPONENT).contains(&scale)
        && amount.digits() <= MAX_AMOUNT_DIGITS
}

/// Digits after the decimal point, trailing zeros ignored.
pub fn decimal_places(amount: &BigDecimal) -> i64 {
    amount.normalized().as_bigint_and_exponent().1.max(0)
}

/// Fixed packages offered on the top-up page: (id, amount).
const PACKAGE_AMOUNTS: [(&str, u32); 4] = [
    ("balance_5", 5),
    ("balance_15", 15),
    ("balance_30", 30),
    ("balance_60", 60),
];

/// Returns the bonus percentage earned by a payment amount.
///
/// Non-decreasing in `amount`; amounts below the lowest tier earn nothing.
pub fn bonus_percent(amount: &BigDecimal) -> u32 {
    BONUS_TIERS
        .iter()
        .find(|tier| amount >= &BigDecimal::from(tier.min_amount))
        .map(|tier| tier.bonus_percent)
        .unwrap_or(0)
}

/// The credit a payment buys: face value, bonus, and their sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditQuote {
    pub amount: BigDecimal,
    pub bonus_percent: u32,
    pub bonus_amount: BigDecimal,
    pub total_credits: BigDecimal,
}

impl CreditQuote {
    /// Applies the tier schedule to an amount. Exact decimal arithmetic.
    pub fn for_amount(amount: BigDecimal) -> Self {
        let bonus_percent = bonus_percent(&amount);
        let rate = BigDecimal::new(BigInt::from(bonus_percent), 2);
        let bonus_amount = &amount * &rate;
        let total_credits = &amount + &bonus_amount;
        Self {
            amount,
            bonus_percent,
            bonus_amount,
            total_credits,
        }
    }
}

/// A fixed top-up package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePackage {
    pub id: &'static str,
    #[serde(flatten)]
    pub quote: CreditQuote,
}

/// All packages, cheapest first.
pub fn packages() -> Vec<BalancePackage> {
    PACKAGE_AMOUNTS
        .iter()
        .map(|&(id, amount)| BalancePackage {
            id,
            quote: CreditQuote::for_amount(BigDecimal::from(amount)),
        })
        .collect()
}

/// Looks up a package by id.
pub fn find_package(id: &str) -> Option<BalancePackage> {
    packages().into_iter().find(|p| p.id == id)
}
