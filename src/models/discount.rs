use serde::{Deserialize, Serialize};

/// JSONPath of the checkout-level subtotal line, the default allocation
/// target for discount applications.
pub const SUBTOTAL_PATH: &str = "$.totals[?(@.type=='subtotal')]";

/// JSONPath of a specific line item's subtotal line, used when an
/// application is allocated against a single line.
pub fn line_item_subtotal_path(line_item_id: &str) -> String {
    format!(
        "$.line_items[?(@.id=='{}')].totals[?(@.type=='subtotal')]",
        line_item_id
    )
}

/// Requested codes (caller-supplied) plus the applications the resolver
/// computed from them. `applied` is read-only to callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discounts {
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<DiscountApplication>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountApplication {
    pub code: String,
    pub title: String,
    pub amount: i64,
    #[serde(default)]
    pub automatic: bool,
    pub allocations: Vec<Allocation>,
}

/// Which total line absorbed (part of) a discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub path: String,
    pub amount: i64,
}

impl Allocation {
    pub fn subtotal(amount: i64) -> Self {
        Self {
            path: SUBTOTAL_PATH.to_string(),
            amount,
        }
    }

    /// Line item id this allocation targets, `None` for checkout-level
    /// allocations.
    pub fn line_item_target(&self) -> Option<&str> {
        let rest = self.path.strip_prefix("$.line_items[?(@.id=='")?;
        let end = rest.find("')]")?;
        Some(&rest[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtotal_allocation_targets_no_line_item() {
        assert_eq!(Allocation::subtotal(100).line_item_target(), None);
    }

    #[test]
    fn line_item_allocation_parses_its_target() {
        let alloc = Allocation {
            path: line_item_subtotal_path("li_42"),
            amount: 250,
        };
        assert_eq!(alloc.line_item_target(), Some("li_42"));
    }
}
