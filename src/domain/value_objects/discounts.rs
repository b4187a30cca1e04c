/// Coupon state for the cycle being billed, read before any decrement.
#[derive(Debug, Clone, Copy)]
pub struct CouponCycleState {
    pub discount_percent: i32,
    pub flat_discount_minor: i32,
    pub remaining_months: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountBreakdown {
    pub discount_minor: i32,
    pub final_minor: i32,
}

/// Computes the amount owed for one cycle. Pure and deterministic; callers
/// must pass the pre-decrement `remaining_months` for the cycle in question.
pub fn discount_for(base_minor: i32, coupon: Option<&CouponCycleState>) -> DiscountBreakdown {
    let base_minor = base_minor.max(0);

    let Some(coupon) = coupon else {
        return DiscountBreakdown {
            discount_minor: 0,
            final_minor: base_minor,
        };
    };

    if coupon.remaining_months.is_some_and(|months| months <= 0) {
        return DiscountBreakdown {
            discount_minor: 0,
            final_minor: base_minor,
        };
    }

    let discount_minor = if coupon.discount_percent > 0 {
        // i64 keeps base * percent from overflowing before the division.
        ((base_minor as i64 * coupon.discount_percent as i64) / 100) as i32
    } else if coupon.flat_discount_minor > 0 {
        coupon.flat_discount_minor.min(base_minor)
    } else {
        0
    };

    DiscountBreakdown {
        discount_minor,
        final_minor: (base_minor - discount_minor).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percent(pct: i32, remaining: Option<i32>) -> CouponCycleState {
        CouponCycleState {
            discount_percent: pct,
            flat_discount_minor: 0,
            remaining_months: remaining,
        }
    }

    fn flat(amount: i32, remaining: Option<i32>) -> CouponCycleState {
        CouponCycleState {
            discount_percent: 0,
            flat_discount_minor: amount,
            remaining_months: remaining,
        }
    }

    #[test]
    fn no_coupon_charges_full_price() {
        let breakdown = discount_for(10_000, None);
        assert_eq!(breakdown.discount_minor, 0);
        assert_eq!(breakdown.final_minor, 10_000);
    }

    #[test]
    fn percent_discount_floors() {
        // 33% of 9_999 = 3_299.67, floored.
        let breakdown = discount_for(9_999, Some(&percent(33, None)));
        assert_eq!(breakdown.discount_minor, 3_299);
        assert_eq!(breakdown.final_minor, 6_700);
    }

    #[test]
    fn fifty_percent_halves() {
        let breakdown = discount_for(10_000, Some(&percent(50, Some(3))));
        assert_eq!(breakdown.discount_minor, 5_000);
        assert_eq!(breakdown.final_minor, 5_000);
    }

    #[test]
    fn full_percent_discount_reaches_zero() {
        let breakdown = discount_for(10_000, Some(&percent(100, Some(1))));
        assert_eq!(breakdown.discount_minor, 10_000);
        assert_eq!(breakdown.final_minor, 0);
    }

    #[test]
    fn flat_discount_is_clamped_to_base() {
        let breakdown = discount_for(4_000, Some(&flat(9_000, None)));
        assert_eq!(breakdown.discount_minor, 4_000);
        assert_eq!(breakdown.final_minor, 0);
    }

    #[test]
    fn flat_discount_below_base() {
        let breakdown = discount_for(10_000, Some(&flat(2_500, Some(6))));
        assert_eq!(breakdown.discount_minor, 2_500);
        assert_eq!(breakdown.final_minor, 7_500);
    }

    #[test]
    fn exhausted_coupon_charges_full_price() {
        let breakdown = discount_for(10_000, Some(&percent(50, Some(0))));
        assert_eq!(breakdown.discount_minor, 0);
        assert_eq!(breakdown.final_minor, 10_000);
    }

    #[test]
    fn unlimited_coupon_keeps_discounting() {
        let breakdown = discount_for(10_000, Some(&percent(10, None)));
        assert_eq!(breakdown.final_minor, 9_000);
    }

    #[test]
    fn zero_base_never_goes_negative() {
        let breakdown = discount_for(0, Some(&flat(5_000, None)));
        assert_eq!(breakdown.discount_minor, 0);
        assert_eq!(breakdown.final_minor, 0);
    }
}
