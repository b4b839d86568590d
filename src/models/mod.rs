//! Wire and domain model for the checkout engine.

pub mod checkout;
pub mod discount;
pub mod fulfillment;
pub mod order;
pub mod payment;
pub mod requests;

pub use checkout::{
    Buyer, Checkout, CheckoutStatus, Item, LineItem, Message, PlatformConfig, Total, TotalType,
};
pub use discount::{Allocation, DiscountApplication, Discounts};
pub use fulfillment::{
    Destination, Fulfillment, FulfillmentGroup, FulfillmentMethod, FulfillmentOption,
    PostalAddress, ShippingMethod,
};
pub use order::{
    Expectation, ExpectationLineItem, FulfillmentEvent, Order, OrderConfirmation,
    OrderFulfillment, OrderLineItem, OrderQuantity,
};
pub use payment::{Payment, PaymentCredential, PaymentHandler, PaymentInstrument};
pub use requests::{
    CheckoutCompleteRequest, CheckoutCreateRequest, CheckoutUpdateRequest, DestinationInput,
    DiscountsInput, FulfillmentGroupInput, FulfillmentInput, FulfillmentMethodInput, ItemInput,
    LineItemInput, PaymentInput, ShippingMethodInput,
};
