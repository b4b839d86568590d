//! Fulfillment resolver: generates destination candidates, partitions line
//! items into groups once a destination is chosen, and prices each group's
//! options through the injected shipping-rate store.

use tracing::debug;
use uuid::Uuid;

use crate::errors::{ResolutionError, ServiceError};
use crate::models::checkout::LineItem;
use crate::models::fulfillment::{
    Destination, Fulfillment, FulfillmentGroup, FulfillmentMethod, ShippingMethod,
};
use crate::models::requests::{DestinationInput, FulfillmentInput, FulfillmentMethodInput};
use crate::stores::{AddressBook, ShippingRates};

pub struct FulfillmentOutcome {
    pub fulfillment: Fulfillment,
    pub errors: Vec<ResolutionError>,
}

/// Rebuilds the fulfillment section from the caller's request merged against
/// the previous state, then re-prices every method with a valid destination.
///
/// When no fulfillment section was supplied the previous methods are kept
/// and only re-priced (line items may have changed). Within a supplied
/// method the request carries replace semantics: selections not restated are
/// cleared.
pub async fn resolve(
    rates: &dyn ShippingRates,
    address_book: &dyn AddressBook,
    line_items: &[LineItem],
    requested: Option<&FulfillmentInput>,
    previous: &Fulfillment,
    buyer_email: Option<&str>,
) -> Result<FulfillmentOutcome, ServiceError> {
    let mut errors = Vec::new();

    let mut methods = match requested {
        Some(input) => {
            assemble_methods(address_book, line_items, input, previous, buyer_email).await?
        }
        None => previous.methods.clone(),
    };

    for method in &mut methods {
        let FulfillmentMethod::Shipping(shipping) = method;
        price_shipping_method(rates, line_items, shipping, &mut errors).await?;
    }

    Ok(FulfillmentOutcome {
        fulfillment: Fulfillment { methods },
        errors,
    })
}

async fn assemble_methods(
    address_book: &dyn AddressBook,
    line_items: &[LineItem],
    input: &FulfillmentInput,
    previous: &Fulfillment,
    buyer_email: Option<&str>,
) -> Result<Vec<FulfillmentMethod>, ServiceError> {
    let all_line_ids: Vec<String> = line_items.iter().map(|li| li.id.clone()).collect();
    let mut methods = Vec::with_capacity(input.methods.len());

    for method_input in &input.methods {
        let FulfillmentMethodInput::Shipping(m_req) = method_input;

        // Match the existing method to preserve state; a request without an
        // id matches the sole existing method if there is exactly one.
        let existing = previous.methods.iter().find_map(|m| {
            let FulfillmentMethod::Shipping(sm) = m;
            match &m_req.id {
                Some(id) => (&sm.id == id).then_some(sm),
                None => (previous.methods.len() == 1).then_some(sm),
            }
        });

        let method_id = m_req
            .id
            .clone()
            .or_else(|| existing.map(|m| m.id.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut covered: Vec<String> = m_req
            .line_item_ids
            .clone()
            .or_else(|| existing.map(|m| m.line_item_ids.clone()))
            .unwrap_or_else(|| all_line_ids.clone())
            .into_iter()
            .filter(|id| all_line_ids.contains(id))
            .collect();
        if covered.is_empty() {
            covered = all_line_ids.clone();
        }

        let destinations = match &m_req.destinations {
            Some(inputs) => {
                let mut destinations = Vec::with_capacity(inputs.len());
                for dest_input in inputs {
                    destinations.push(register_destination(address_book, dest_input, buyer_email).await?);
                }
                destinations
            }
            None => match existing {
                Some(m) if !m.destinations.is_empty() => m.destinations.clone(),
                _ => match buyer_email {
                    Some(email) => address_book.addresses_for(email).await?,
                    None => Vec::new(),
                },
            },
        };

        let groups = match &m_req.groups {
            Some(group_inputs) => group_inputs
                .iter()
                .map(|g_req| FulfillmentGroup {
                    id: g_req
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("group_{}", Uuid::new_v4())),
                    line_item_ids: g_req
                        .line_item_ids
                        .clone()
                        .unwrap_or_else(|| covered.clone()),
                    options: Vec::new(),
                    selected_option_id: g_req.selected_option_id.clone(),
                })
                .collect(),
            None => existing.map(|m| m.groups.clone()).unwrap_or_default(),
        };

        methods.push(FulfillmentMethod::Shipping(ShippingMethod {
            id: method_id,
            line_item_ids: covered,
            destinations,
            selected_destination_id: m_req.selected_destination_id.clone(),
            groups,
        }));
    }

    Ok(methods)
}

async fn register_destination(
    address_book: &dyn AddressBook,
    input: &DestinationInput,
    buyer_email: Option<&str>,
) -> Result<Destination, ServiceError> {
    let mut destination = Destination {
        id: input
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        street_address: input.street_address.clone(),
        address_locality: input.address_locality.clone(),
        address_region: input.address_region.clone(),
        postal_code: input.postal_code.clone(),
        address_country: input.address_country.clone(),
    };
    if let Some(email) = buyer_email {
        destination.id = address_book.remember(email, &destination).await?;
    }
    Ok(destination)
}

async fn price_shipping_method(
    rates: &dyn ShippingRates,
    line_items: &[LineItem],
    shipping: &mut ShippingMethod,
    errors: &mut Vec<ResolutionError>,
) -> Result<(), ServiceError> {
    if let Some(selected) = shipping.selected_destination_id.clone() {
        if !shipping.destinations.iter().any(|d| d.id == selected) {
            debug!(destination = %selected, "selected destination unknown");
            errors.push(ResolutionError::InvalidDestination(selected));
            shipping.selected_destination_id = None;
        }
    }

    let Some(destination) = shipping.selected_destination().cloned() else {
        return Ok(());
    };

    let covered_items: Vec<&LineItem> = line_items
        .iter()
        .filter(|li| shipping.line_item_ids.contains(&li.id))
        .collect();
    let item_ids: Vec<String> = covered_items.iter().map(|li| li.item.id.clone()).collect();
    let subtotal: i64 = covered_items.iter().map(|li| li.subtotal()).sum();

    let options = rates.options_for(&destination, &item_ids, subtotal).await?;

    if shipping.groups.is_empty() {
        shipping.groups.push(FulfillmentGroup {
            id: format!("group_{}", Uuid::new_v4()),
            line_item_ids: shipping.line_item_ids.clone(),
            options,
            selected_option_id: None,
        });
        return Ok(());
    }

    for group in &mut shipping.groups {
        group.options = options.clone();
        if let Some(selected) = group.selected_option_id.clone() {
            if !group.options.iter().any(|o| o.id == selected) {
                debug!(option = %selected, "selected option unknown");
                errors.push(ResolutionError::InvalidOption(selected));
                group.selected_option_id = None;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkout::Item;
    use crate::models::requests::FulfillmentGroupInput;
    use crate::stores::{InMemoryAddressBook, InMemoryShippingRates, ShippingRate};

    fn rates() -> InMemoryShippingRates {
        InMemoryShippingRates::new(
            vec![
                ShippingRate {
                    id: "std-ship".to_string(),
                    country_code: "US".to_string(),
                    service_level: "standard".to_string(),
                    price: 0,
                    title: "Standard Shipping".to_string(),
                },
                ShippingRate {
                    id: "exp-ship".to_string(),
                    country_code: "US".to_string(),
                    service_level: "express".to_string(),
                    price: 1500,
                    title: "Express Shipping".to_string(),
                },
            ],
            vec![],
        )
    }

    fn lines() -> Vec<LineItem> {
        vec![LineItem {
            id: "li_1".to_string(),
            item: Item {
                id: "bouquet_roses".to_string(),
                title: "Bouquet of Red Roses".to_string(),
                price: 3500,
            },
            quantity: 1,
            totals: vec![],
            parent_id: None,
        }]
    }

    fn shipping_input(m: ShippingMethodInput) -> FulfillmentInput {
        FulfillmentInput {
            methods: vec![FulfillmentMethodInput::Shipping(m)],
        }
    }

    use crate::models::requests::ShippingMethodInput;

    #[tokio::test]
    async fn method_without_destination_yields_candidates_and_no_groups() {
        let book = InMemoryAddressBook::new();
        let outcome = resolve(
            &rates(),
            &book,
            &lines(),
            Some(&shipping_input(ShippingMethodInput::default())),
            &Fulfillment::default(),
            None,
        )
        .await
        .unwrap();

        let FulfillmentMethod::Shipping(m) = &outcome.fulfillment.methods[0];
        assert!(m.destinations.is_empty());
        assert!(m.groups.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn selecting_a_destination_generates_a_priced_group() {
        let book = InMemoryAddressBook::new();
        let input = shipping_input(ShippingMethodInput {
            destinations: Some(vec![DestinationInput {
                id: Some("dest_1".to_string()),
                street_address: Some("123 Main St".to_string()),
                address_locality: Some("Anytown".to_string()),
                address_region: Some("CA".to_string()),
                postal_code: Some("12345".to_string()),
                address_country: "US".to_string(),
            }]),
            selected_destination_id: Some("dest_1".to_string()),
            ..Default::default()
        });

        let outcome = resolve(&rates(), &book, &lines(), Some(&input), &Fulfillment::default(), None)
            .await
            .unwrap();

        let FulfillmentMethod::Shipping(m) = &outcome.fulfillment.methods[0];
        assert_eq!(m.groups.len(), 1);
        assert_eq!(m.groups[0].line_item_ids, vec!["li_1".to_string()]);
        let ids: Vec<_> = m.groups[0].options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["std-ship", "exp-ship"]);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn dangling_destination_selection_is_reported_and_cleared() {
        let book = InMemoryAddressBook::new();
        let input = shipping_input(ShippingMethodInput {
            selected_destination_id: Some("dest_missing".to_string()),
            ..Default::default()
        });

        let outcome = resolve(&rates(), &book, &lines(), Some(&input), &Fulfillment::default(), None)
            .await
            .unwrap();

        let FulfillmentMethod::Shipping(m) = &outcome.fulfillment.methods[0];
        assert_eq!(m.selected_destination_id, None);
        assert_eq!(
            outcome.errors,
            vec![ResolutionError::InvalidDestination(
                "dest_missing".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn dangling_option_selection_is_reported_and_cleared() {
        let book = InMemoryAddressBook::new();
        let input = shipping_input(ShippingMethodInput {
            destinations: Some(vec![DestinationInput {
                id: Some("dest_1".to_string()),
                street_address: None,
                address_locality: None,
                address_region: None,
                postal_code: None,
                address_country: "US".to_string(),
            }]),
            selected_destination_id: Some("dest_1".to_string()),
            groups: Some(vec![FulfillmentGroupInput {
                selected_option_id: Some("overnight".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let outcome = resolve(&rates(), &book, &lines(), Some(&input), &Fulfillment::default(), None)
            .await
            .unwrap();

        let FulfillmentMethod::Shipping(m) = &outcome.fulfillment.methods[0];
        assert_eq!(m.groups[0].selected_option_id, None);
        assert_eq!(
            outcome.errors,
            vec![ResolutionError::InvalidOption("overnight".to_string())]
        );
    }

    #[tokio::test]
    async fn buyer_addresses_become_candidate_destinations() {
        let book = InMemoryAddressBook::new();
        book.remember(
            "ada@example.com",
            &Destination {
                id: "addr_1".to_string(),
                street_address: Some("123 Analytical Way".to_string()),
                address_locality: Some("San Francisco".to_string()),
                address_region: Some("CA".to_string()),
                postal_code: Some("94105".to_string()),
                address_country: "US".to_string(),
            },
        )
        .await
        .unwrap();

        let outcome = resolve(
            &rates(),
            &book,
            &lines(),
            Some(&shipping_input(ShippingMethodInput::default())),
            &Fulfillment::default(),
            Some("ada@example.com"),
        )
        .await
        .unwrap();

        let FulfillmentMethod::Shipping(m) = &outcome.fulfillment.methods[0];
        assert_eq!(m.destinations.len(), 1);
        assert_eq!(m.destinations[0].id, "addr_1");
    }

    #[tokio::test]
    async fn omitted_section_preserves_and_reprices_previous_methods() {
        let book = InMemoryAddressBook::new();
        let input = shipping_input(ShippingMethodInput {
            destinations: Some(vec![DestinationInput {
                id: Some("dest_1".to_string()),
                street_address: None,
                address_locality: None,
                address_region: None,
                postal_code: None,
                address_country: "US".to_string(),
            }]),
            selected_destination_id: Some("dest_1".to_string()),
            ..Default::default()
        });
        let first = resolve(&rates(), &book, &lines(), Some(&input), &Fulfillment::default(), None)
            .await
            .unwrap();

        let second = resolve(&rates(), &book, &lines(), None, &first.fulfillment, None)
            .await
            .unwrap();

        let FulfillmentMethod::Shipping(m) = &second.fulfillment.methods[0];
        assert_eq!(m.selected_destination_id.as_deref(), Some("dest_1"));
        assert_eq!(m.groups.len(), 1);
        assert!(!m.groups[0].options.is_empty());
    }
}
