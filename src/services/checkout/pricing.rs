//! Pricing engine: folds line-level and checkout-level totals from catalog
//! prices, discount allocations, and fulfillment selections. All arithmetic
//! is exact-integer in minor currency units.

use crate::models::checkout::{Checkout, Total, TotalType};
use crate::models::discount::DiscountApplication;

/// Optional tax contributor. The engine ships without one configured; tax
/// is treated as zero and no tax line is emitted.
pub trait TaxContributor: Send + Sync {
    /// Tax in minor units for the given discounted subtotal and fulfillment
    /// amount. `None` suppresses the tax line entirely.
    fn tax_for(&self, discounted_subtotal: i64, fulfillment: i64) -> Option<i64>;
}

/// Recomputes `line_items[].totals` and `checkout.totals` in place.
///
/// The fold is deterministic and idempotent: running it twice over the same
/// merged state yields identical totals. `subtotal` and `total` lines are
/// always present; `discount` appears whenever applications exist and
/// `fulfillment` whenever a group selection resolves, even at amount zero.
pub fn recompute(checkout: &mut Checkout, tax: Option<&dyn TaxContributor>) {
    let applications = checkout.discounts.applied.clone();

    let mut subtotal = 0i64;
    for line in &mut checkout.line_items {
        let line_subtotal = line.subtotal();
        let line_discount = allocated_to_line(&applications, &line.id).min(line_subtotal);

        line.totals = Vec::with_capacity(3);
        line.totals.push(Total::new(TotalType::Subtotal, line_subtotal));
        if line_discount > 0 {
            line.totals.push(Total::new(TotalType::Discount, line_discount));
        }
        line.totals
            .push(Total::new(TotalType::Total, line_subtotal - line_discount));

        subtotal += line_subtotal;
    }

    let mut totals = Vec::with_capacity(5);
    totals.push(Total::new(TotalType::Subtotal, subtotal));

    let discount: i64 = applications.iter().map(|a| a.amount).sum();
    if !applications.is_empty() {
        totals.push(Total::new(TotalType::Discount, discount));
    }

    let mut fulfillment = 0i64;
    let mut has_selection = false;
    for method in &checkout.fulfillment.methods {
        for group in method.groups() {
            if let Some(option) = group.selected_option() {
                has_selection = true;
                fulfillment += option.total();
            }
        }
    }
    if has_selection {
        totals.push(Total::new(TotalType::Fulfillment, fulfillment));
    }

    let mut total = subtotal - discount + fulfillment;
    if let Some(contributor) = tax {
        if let Some(tax_amount) = contributor.tax_for(subtotal - discount, fulfillment) {
            totals.push(Total::new(TotalType::Tax, tax_amount));
            total += tax_amount;
        }
    }

    totals.push(Total::new(TotalType::Total, total));
    checkout.totals = totals;
}

fn allocated_to_line(applications: &[DiscountApplication], line_item_id: &str) -> i64 {
    applications
        .iter()
        .flat_map(|a| a.allocations.iter())
        .filter(|alloc| alloc.line_item_target() == Some(line_item_id))
        .map(|alloc| alloc.amount)
        .sum()
}
