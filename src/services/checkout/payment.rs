//! Payment completion: validates the supplied instrument against the
//! checkout's offered handlers and delegates authorization to the injected
//! collaborator.

use tracing::info;

use crate::errors::ServiceError;
use crate::models::payment::{Payment, PaymentInstrument};
use crate::stores::PaymentAuthorizer;

/// Authorizes `instrument` for a checkout offering `payment.handlers`.
///
/// The handler must be among the offered set; credential verification is
/// the authorizer's concern. Declines leave the checkout untouched.
pub async fn authorize(
    authorizer: &dyn PaymentAuthorizer,
    payment: &Payment,
    instrument: &PaymentInstrument,
    risk_signals: Option<&serde_json::Value>,
) -> Result<(), ServiceError> {
    if instrument.handler_id.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "payment_data.handler_id cannot be empty".to_string(),
        ));
    }
    if !payment.offers_handler(&instrument.handler_id) {
        return Err(ServiceError::UnsupportedHandler(instrument.handler_id.clone()));
    }
    if instrument.credential.is_none() {
        return Err(ServiceError::ValidationError(
            "Missing credentials in instrument".to_string(),
        ));
    }

    info!(handler = %instrument.handler_id, "authorizing payment instrument");
    authorizer.authorize(instrument, risk_signals).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{PaymentCredential, PaymentHandler};
    use crate::stores::MockPaymentAuthorizer;

    fn offered() -> Payment {
        Payment {
            handlers: vec![PaymentHandler::new(
                "mock_payment_handler",
                "mock_payment_handler",
            )],
            instruments: vec![],
            selected_instrument_id: None,
        }
    }

    fn instrument(handler_id: &str, token: &str) -> PaymentInstrument {
        PaymentInstrument {
            id: "instr_1".to_string(),
            handler_id: handler_id.to_string(),
            instrument_type: "card".to_string(),
            brand: Some("Visa".to_string()),
            last_digits: Some("4242".to_string()),
            credential: Some(PaymentCredential::Token {
                token: token.to_string(),
            }),
            billing_address: None,
        }
    }

    #[tokio::test]
    async fn offered_handler_with_success_token_authorizes() {
        let authorizer = MockPaymentAuthorizer::new();
        let result = authorize(
            &authorizer,
            &offered(),
            &instrument("mock_payment_handler", "success_token"),
            None,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unknown_handler_is_rejected_before_authorization() {
        let authorizer = MockPaymentAuthorizer::new();
        let err = authorize(
            &authorizer,
            &offered(),
            &instrument("shop_pay", "success_token"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedHandler(_)));
    }

    #[tokio::test]
    async fn missing_credential_is_a_validation_error() {
        let authorizer = MockPaymentAuthorizer::new();
        let mut instr = instrument("mock_payment_handler", "success_token");
        instr.credential = None;
        let err = authorize(&authorizer, &offered(), &instr, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
