//! Discount resolver: validates requested codes against the injected rule
//! store and yields ordered application records with allocations.

use tracing::debug;

use crate::config::DiscountReapplication;
use crate::errors::{ResolutionError, ServiceError};
use crate::models::checkout::LineItem;
use crate::models::discount::{Allocation, DiscountApplication};
use crate::stores::{DiscountKind, DiscountRules};

pub struct DiscountOutcome {
    pub applications: Vec<DiscountApplication>,
    pub errors: Vec<ResolutionError>,
}

/// Resolves `codes` (in the order supplied) against the rule store.
///
/// Percentage rules apply to the eligible subtotal at application time;
/// fixed-amount rules are clamped to the eligible subtotal. Each application
/// is additionally clamped to the discount headroom left on the checkout, so
/// the stacked discount never exceeds the subtotal. Unknown codes are
/// reported as recoverable errors without failing the resolution.
///
/// `previous` are the applications already on the checkout; whether they are
/// kept or replaced is governed by the reapplication `mode`.
pub async fn resolve(
    rules: &dyn DiscountRules,
    line_items: &[LineItem],
    codes: &[String],
    previous: &[DiscountApplication],
    mode: DiscountReapplication,
) -> Result<DiscountOutcome, ServiceError> {
    let mut applications = match mode {
        DiscountReapplication::Replace => Vec::new(),
        DiscountReapplication::Accumulate => previous.to_vec(),
    };
    let mut errors = Vec::new();

    let subtotal: i64 = line_items.iter().map(|li| li.subtotal()).sum();
    let mut remaining = subtotal - applications.iter().map(|a| a.amount).sum::<i64>();

    let found = rules.rules_by_codes(codes).await?;

    for code in codes {
        let Some(rule) = found.iter().find(|r| &r.code == code) else {
            debug!(code = %code, "discount code not found");
            errors.push(ResolutionError::UnknownCode(code.clone()));
            continue;
        };

        let eligible_subtotal: i64 = match &rule.eligible_item_ids {
            Some(eligible) => line_items
                .iter()
                .filter(|li| eligible.contains(&li.item.id))
                .map(|li| li.subtotal())
                .sum(),
            None => subtotal,
        };

        let computed = match rule.kind {
            DiscountKind::Percentage => eligible_subtotal * rule.value / 100,
            DiscountKind::FixedAmount => rule.value.min(eligible_subtotal),
        };
        let amount = computed.min(remaining).max(0);
        if amount == 0 {
            continue;
        }
        remaining -= amount;

        applications.push(DiscountApplication {
            code: rule.code.clone(),
            title: rule.title.clone(),
            amount,
            automatic: false,
            allocations: vec![Allocation::subtotal(amount)],
        });
    }

    Ok(DiscountOutcome {
        applications,
        errors,
    })
}
