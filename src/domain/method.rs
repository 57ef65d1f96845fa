use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One selectable payment option exposed to donors. Several slugs may point
/// at the same gateway implementation and differ only in `settings`.
/// Configs are deactivated, never deleted; historical transactions keep a
/// denormalized slug snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodConfig {
    pub id: Uuid,
    pub slug: String,
    pub gateway: String,
    pub title: String,
    pub fee_percent_bp: i32,
    pub fee_fixed_minor: i64,
    pub min_amount_minor: i64,
    pub max_amount_minor: i64,
    pub is_active: bool,
    pub test_mode: bool,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    NonPositive,
    BelowMin,
    AboveMax,
    MethodInactive,
}

pub fn validate_amount(cfg: &PaymentMethodConfig, amount_minor: i64) -> Result<(), AmountError> {
    if !cfg.is_active {
        return Err(AmountError::MethodInactive);
    }
    if amount_minor <= 0 {
        return Err(AmountError::NonPositive);
    }
    if amount_minor < cfg.min_amount_minor {
        return Err(AmountError::BelowMin);
    }
    if cfg.max_amount_minor > 0 && amount_minor > cfg.max_amount_minor {
        return Err(AmountError::AboveMax);
    }
    Ok(())
}

/// Fee in minor units: percentage in basis points plus a fixed component.
/// Integer arithmetic, rounded down.
pub fn fee_for(cfg: &PaymentMethodConfig, amount_minor: i64) -> i64 {
    amount_minor * cfg.fee_percent_bp as i64 / 10_000 + cfg.fee_fixed_minor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(min: i64, max: i64, active: bool) -> PaymentMethodConfig {
        PaymentMethodConfig {
            id: Uuid::new_v4(),
            slug: "sbp".to_string(),
            gateway: "yookassa".to_string(),
            title: "СБП".to_string(),
            fee_percent_bp: 250,
            fee_fixed_minor: 0,
            min_amount_minor: min,
            max_amount_minor: max,
            is_active: active,
            test_mode: false,
            settings: serde_json::json!({"payment_method_data": {"type": "sbp"}}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_out_of_bounds_amounts() {
        let c = cfg(1000, 50_000_00, true);
        assert_eq!(validate_amount(&c, 0), Err(AmountError::NonPositive));
        assert_eq!(validate_amount(&c, 500), Err(AmountError::BelowMin));
        assert_eq!(validate_amount(&c, 60_000_00), Err(AmountError::AboveMax));
        assert_eq!(validate_amount(&c, 10_000), Ok(()));
    }

    #[test]
    fn zero_max_means_unbounded() {
        let c = cfg(100, 0, true);
        assert_eq!(validate_amount(&c, i64::MAX / 2), Ok(()));
    }

    #[test]
    fn inactive_method_rejected_before_amount_checks() {
        let c = cfg(1000, 0, false);
        assert_eq!(validate_amount(&c, 10_000), Err(AmountError::MethodInactive));
    }

    #[test]
    fn fee_combines_percentage_and_fixed() {
        let mut c = cfg(0, 0, true);
        c.fee_percent_bp = 290; // 2.9%
        c.fee_fixed_minor = 30;
        assert_eq!(fee_for(&c, 10_000), 290 + 30);
    }
}
