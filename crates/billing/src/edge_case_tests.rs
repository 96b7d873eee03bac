// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing System
//!
//! End-to-end over the billing service with an in-memory store:
//! - Plan resolution boundaries
//! - Stripe webhook verification and reconciliation
//! - Solidgate callbacks and order events
//! - Customer creation races and checkout

/// Plan fields of a stored user, for before/after comparisons
fn plan_state(user: &transactiq_shared::User) -> (i32, Option<time::OffsetDateTime>, Option<String>) {
    (
        user.plan_id,
        user.plan_expire_date,
        user.payment_processor.clone(),
    )
}

#[cfg(test)]
mod plan_resolution_tests {
    use crate::plans::{test_catalog, PlanTier};
    use time::macros::datetime;
    use transactiq_shared::Gateway;

    // =========================================================================
    // Same input and clock resolve to the same plan every time
    // =========================================================================
    #[test]
    fn test_resolution_is_deterministic() {
        let catalog = test_catalog();
        let now = datetime!(2025-03-31 23:59:59 UTC);

        for gateway in [Gateway::Stripe, Gateway::Solidgate] {
            for tier in PlanTier::ALL {
                let product_id = catalog.prices(gateway).price_id_for_tier(tier).to_string();
                let first = catalog.resolve_plan(gateway, &product_id, now);
                let second = catalog.resolve_plan(gateway, &product_id, now);
                assert!(first.is_some(), "{} {} should resolve", gateway, tier);
                assert_eq!(first, second);
            }
        }
    }

    // =========================================================================
    // Product ids are scoped to their gateway
    // =========================================================================
    #[test]
    fn test_product_ids_do_not_cross_gateways() {
        let catalog = test_catalog();
        let now = datetime!(2025-03-01 00:00 UTC);

        assert!(catalog.resolve_plan(Gateway::Solidgate, "price_month", now).is_none());
        assert!(catalog.resolve_plan(Gateway::Stripe, "sg_month", now).is_none());
        assert!(catalog.resolve_plan(Gateway::Stripe, "", now).is_none());
    }

    // =========================================================================
    // Quarterly from Nov 30 lands on the last day of February
    // =========================================================================
    #[test]
    fn test_quarterly_crosses_year_and_clamps() {
        let catalog = test_catalog();
        let resolved = catalog
            .resolve_plan(Gateway::Stripe, "price_quarter", datetime!(2025-11-30 08:00 UTC))
            .unwrap();

        assert_eq!(resolved.plan_id, 2);
        assert_eq!(resolved.expires_at, datetime!(2026-02-28 08:00 UTC));
    }
}

#[cfg(test)]
mod stripe_webhook_tests {
    use std::sync::Arc;

    use time::macros::datetime;
    use transactiq_shared::{User, UserStore};

    use super::plan_state;
    use crate::error::BillingError;
    use crate::reconcile::ReconcileOutcome;
    use crate::testing::{stripe_signature_header, test_service, FakeStripeGateway};
    use crate::webhooks::{WebhookOutcome, SIGNATURE_TOLERANCE_SECS};

    fn invoice_paid(customer: &str, subscription: Option<&str>) -> String {
        let subscription = subscription
            .map(|s| format!(r#","subscription":"{}""#, s))
            .unwrap_or_default();
        format!(
            r#"{{"id":"evt_test","type":"invoice.paid","data":{{"object":{{"id":"in_test","customer":"{}"{}}}}}}}"#,
            customer, subscription
        )
    }

    async fn stripe_user(store: &impl UserStore, customer_id: &str) -> User {
        let mut user = User::new("payer@example.com", "Payer");
        user.stripe_customer_id = Some(customer_id.to_string());
        store.insert(&user).await.unwrap();
        user
    }

    // =========================================================================
    // Monthly invoice.paid sets plan 1, one month out, processor stripe
    // =========================================================================
    #[tokio::test]
    async fn test_monthly_invoice_paid_applies_plan() {
        let stripe = Arc::new(FakeStripeGateway::new().with_subscription("sub_1", "price_month"));
        let (service, store) = test_service(stripe, None);
        let user = stripe_user(&store, "cus_1").await;

        let now = datetime!(2025-01-31 12:00 UTC);
        let payload = invoice_paid("cus_1", Some("sub_1"));
        let header = stripe_signature_header(&payload, now.unix_timestamp());

        let event = service
            .webhooks
            .verify_event_at(&payload, &header, now.unix_timestamp())
            .unwrap();
        let outcome = service.webhooks.handle_event_at(event, now).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Reconciled(ReconcileOutcome::Applied {
                user_id: user.id,
                plan_id: 1,
                expires_at: datetime!(2025-02-28 12:00 UTC),
            })
        );

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_id, 1);
        assert_eq!(stored.plan_expire_date, Some(datetime!(2025-02-28 12:00 UTC)));
        assert_eq!(stored.payment_processor.as_deref(), Some("stripe"));
    }

    // =========================================================================
    // Re-delivery of the same event leaves the same plan state
    // =========================================================================
    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let stripe = Arc::new(FakeStripeGateway::new().with_subscription("sub_1", "price_year"));
        let (service, store) = test_service(stripe, None);
        let user = stripe_user(&store, "cus_1").await;

        let now = datetime!(2025-06-01 09:00 UTC);
        let payload = invoice_paid("cus_1", Some("sub_1"));
        let header = stripe_signature_header(&payload, now.unix_timestamp());

        let mut states = Vec::new();
        for _ in 0..2 {
            let event = service
                .webhooks
                .verify_event_at(&payload, &header, now.unix_timestamp())
                .unwrap();
            service.webhooks.handle_event_at(event, now).await.unwrap();
            states.push(plan_state(&store.find_by_id(user.id).await.unwrap().unwrap()));
        }

        assert_eq!(states[0], states[1]);
        assert_eq!(states[0].0, 3);
    }

    // =========================================================================
    // Unknown customer: acknowledged, nothing written, nobody created
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_customer_mutates_nothing() {
        let stripe = Arc::new(FakeStripeGateway::new().with_subscription("sub_1", "price_month"));
        let (service, store) = test_service(stripe, None);
        let user = stripe_user(&store, "cus_known").await;
        let before = store.all().await;

        let now = datetime!(2025-01-10 00:00 UTC);
        let payload = invoice_paid("cus_stranger", Some("sub_1"));
        let header = stripe_signature_header(&payload, now.unix_timestamp());
        let event = service
            .webhooks
            .verify_event_at(&payload, &header, now.unix_timestamp())
            .unwrap();

        let outcome = service.webhooks.handle_event_at(event, now).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Reconciled(ReconcileOutcome::UserNotFound));
        assert_eq!(store.all().await, before);
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().plan_id, 0);
    }

    // =========================================================================
    // Price id outside the catalog: acknowledged, plan untouched
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_price_mutates_nothing() {
        let stripe = Arc::new(FakeStripeGateway::new().with_subscription("sub_1", "price_legacy"));
        let (service, store) = test_service(stripe, None);
        let user = stripe_user(&store, "cus_1").await;
        let before = store.find_by_id(user.id).await.unwrap().unwrap();

        let now = datetime!(2025-01-10 00:00 UTC);
        let payload = invoice_paid("cus_1", Some("sub_1"));
        let header = stripe_signature_header(&payload, now.unix_timestamp());
        let event = service
            .webhooks
            .verify_event_at(&payload, &header, now.unix_timestamp())
            .unwrap();

        let outcome = service.webhooks.handle_event_at(event, now).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Reconciled(ReconcileOutcome::UnknownProduct {
                product_id: "price_legacy".to_string()
            })
        );
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_invoice_without_subscription_is_ignored() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = stripe_user(&store, "cus_1").await;

        let now = datetime!(2025-01-10 00:00 UTC);
        let payload = invoice_paid("cus_1", None);
        let header = stripe_signature_header(&payload, now.unix_timestamp());
        let event = service
            .webhooks
            .verify_event_at(&payload, &header, now.unix_timestamp())
            .unwrap();

        let outcome = service.webhooks.handle_event_at(event, now).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().plan_id, 0);
    }

    // =========================================================================
    // Signature checks
    // =========================================================================
    #[test]
    fn test_tampered_payload_rejected() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let now = 1_750_000_000;
        let payload = invoice_paid("cus_1", Some("sub_1"));
        let header = stripe_signature_header(&payload, now);
        let tampered = payload.replace("cus_1", "cus_2");

        assert!(matches!(
            service.webhooks.verify_event_at(&tampered, &header, now),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_timestamp_tolerance_boundary() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let signed_at = 1_750_000_000;
        let payload = invoice_paid("cus_1", Some("sub_1"));
        let header = stripe_signature_header(&payload, signed_at);

        assert!(service
            .webhooks
            .verify_event_at(&payload, &header, signed_at + SIGNATURE_TOLERANCE_SECS)
            .is_ok());
        assert!(matches!(
            service
                .webhooks
                .verify_event_at(&payload, &header, signed_at + SIGNATURE_TOLERANCE_SECS + 1),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_extreme_timestamps_rejected_without_overflow() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let payload = "{}";

        for (signed_at, now) in [
            (i64::MIN, 1_750_000_000),
            (i64::MAX, 1_750_000_000),
            (i64::MIN, i64::MAX),
            (1_750_000_000, i64::MIN),
        ] {
            let header = format!("t={},v1=abcd", signed_at);
            assert!(
                matches!(
                    service.webhooks.verify_event_at(payload, &header, now),
                    Err(BillingError::WebhookSignatureInvalid)
                ),
                "t={} at now={} should be out of tolerance",
                signed_at,
                now
            );
        }
    }

    #[test]
    fn test_any_matching_v1_signature_accepted() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let now = 1_750_000_000;
        let payload = invoice_paid("cus_1", Some("sub_1"));
        let valid = stripe_signature_header(&payload, now);
        let valid_sig = valid.split_once("v1=").unwrap().1;
        let header = format!("t={},v1=deadbeef,v1={},v0=ignored", now, valid_sig);

        assert!(service.webhooks.verify_event_at(&payload, &header, now).is_ok());
    }

    #[test]
    fn test_header_without_timestamp_rejected() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let payload = invoice_paid("cus_1", Some("sub_1"));

        assert!(matches!(
            service.webhooks.verify_event_at(&payload, "v1=abc", 1_750_000_000),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }
}

#[cfg(test)]
mod solidgate_webhook_tests {
    use std::sync::Arc;

    use time::macros::datetime;
    use transactiq_shared::{User, UserStore};

    use super::plan_state;
    use crate::error::BillingError;
    use crate::reconcile::ReconcileOutcome;
    use crate::solidgate::test_webhook_signature;
    use crate::testing::{test_service, test_webhook_keys, FakeStripeGateway};
    use crate::webhooks::WebhookOutcome;

    fn callback(callback_type: &str, email: &str, product_id: &str) -> Vec<u8> {
        format!(
            r#"{{"callback_type":"{}","customer":{{"customer_email":"{}"}},"product":{{"product_id":"{}"}}}}"#,
            callback_type, email, product_id
        )
        .into_bytes()
    }

    // =========================================================================
    // Annual "active" callback sets plan 3, one year out, processor solidgate
    // =========================================================================
    #[tokio::test]
    async fn test_annual_active_applies_plan() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = User::new("sg@example.com", "Sg");
        store.insert(&user).await.unwrap();

        let now = datetime!(2024-02-29 18:30 UTC);
        let event = service
            .solidgate_webhooks
            .verify_event(&callback("active", "SG@example.com", "sg_year"), None, None)
            .unwrap();
        let outcome = service
            .solidgate_webhooks
            .handle_event_at(event, now)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Reconciled(ReconcileOutcome::Applied { plan_id: 3, .. })
        ));
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_id, 3);
        assert_eq!(stored.plan_expire_date, Some(datetime!(2025-02-28 18:30 UTC)));
        assert_eq!(stored.payment_processor.as_deref(), Some("solidgate"));
    }

    // =========================================================================
    // "renew" works with no earlier "active" for the user
    // =========================================================================
    #[tokio::test]
    async fn test_renew_without_prior_active() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = User::new("renewer@example.com", "Renewer");
        store.insert(&user).await.unwrap();

        let now = datetime!(2025-05-05 05:05 UTC);
        let event = service
            .solidgate_webhooks
            .verify_event(&callback("renew", "renewer@example.com", "sg_quarter"), None, None)
            .unwrap();
        service
            .solidgate_webhooks
            .handle_event_at(event, now)
            .await
            .unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.plan_id, 2);
        assert_eq!(stored.plan_expire_date, Some(datetime!(2025-08-05 05:05 UTC)));
    }

    // =========================================================================
    // A later payment on the other gateway overwrites the plan fields
    // =========================================================================
    #[tokio::test]
    async fn test_last_write_wins_across_gateways() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let mut user = User::new("both@example.com", "Both");
        user.plan_id = 3;
        user.payment_processor = Some("stripe".to_string());
        user.plan_expire_date = Some(datetime!(2026-01-01 00:00 UTC));
        store.insert(&user).await.unwrap();

        let now = datetime!(2025-07-01 00:00 UTC);
        let event = service
            .solidgate_webhooks
            .verify_event(&callback("active", "both@example.com", "sg_month"), None, None)
            .unwrap();
        service
            .solidgate_webhooks
            .handle_event_at(event, now)
            .await
            .unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(
            plan_state(&stored),
            (
                1,
                Some(datetime!(2025-08-01 00:00 UTC)),
                Some("solidgate".to_string())
            )
        );
    }

    #[tokio::test]
    async fn test_unknown_email_mutates_nothing() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        store.insert(&User::new("member@example.com", "Member")).await.unwrap();
        let before = store.all().await;

        let event = service
            .solidgate_webhooks
            .verify_event(&callback("active", "ghost@example.com", "sg_month"), None, None)
            .unwrap();
        let outcome = service.solidgate_webhooks.handle_event(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Reconciled(ReconcileOutcome::UserNotFound));
        assert_eq!(store.all().await, before);
    }

    #[tokio::test]
    async fn test_unknown_product_mutates_nothing() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = User::new("member@example.com", "Member");
        store.insert(&user).await.unwrap();

        let event = service
            .solidgate_webhooks
            .verify_event(&callback("active", "member@example.com", "sg_lifetime"), None, None)
            .unwrap();
        let outcome = service.solidgate_webhooks.handle_event(event).await.unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Reconciled(ReconcileOutcome::UnknownProduct { .. })
        ));
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap(), user);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);

        for body in [&b""[..], b"{not json", b"\"active\""] {
            assert!(matches!(
                service.solidgate_webhooks.verify_event(body, None, None),
                Err(BillingError::InvalidPayload(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_callback_type_ignored() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = User::new("member@example.com", "Member");
        store.insert(&user).await.unwrap();

        let event = service
            .solidgate_webhooks
            .verify_event(&callback("cancel", "member@example.com", "sg_month"), None, None)
            .unwrap();
        let outcome = service.solidgate_webhooks.handle_event(event).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap(), user);
    }

    // =========================================================================
    // One-time payment orders are acknowledged without a plan change
    // =========================================================================
    #[tokio::test]
    async fn test_one_time_payment_order() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = User::new("member@example.com", "Member");
        store.insert(&user).await.unwrap();

        for (status, plan_id, one_time) in [
            ("approved", 5, true),
            ("auth_ok", 5, true),
            ("declined", 5, false),
            ("approved", 1, false),
        ] {
            let body = format!(
                r#"{{"order":{{"order_id":"ord_1","status":"{}"}},"order_metadata":{{"plan_id":{}}}}}"#,
                status, plan_id
            );
            let event = service
                .solidgate_webhooks
                .verify_event(body.as_bytes(), None, None)
                .unwrap();
            let outcome = service.solidgate_webhooks.handle_event(event).await.unwrap();

            assert_eq!(
                matches!(outcome, WebhookOutcome::OneTimePayment { .. }),
                one_time,
                "status {} plan {}",
                status,
                plan_id
            );
        }

        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap(), user);
    }

    // =========================================================================
    // With webhook keys configured, deliveries must be signed
    // =========================================================================
    #[test]
    fn test_configured_keys_require_valid_signature() {
        let keys = test_webhook_keys();
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), Some(keys.clone()));
        let body = callback("active", "member@example.com", "sg_month");
        let signature = test_webhook_signature(&keys, &body);

        assert!(matches!(
            service.solidgate_webhooks.verify_event(&body, None, None),
            Err(BillingError::WebhookSignatureMissing)
        ));
        assert!(matches!(
            service
                .solidgate_webhooks
                .verify_event(&body, Some(&keys.public_key), Some("bm90LXRoZS1zaWduYXR1cmU=")),
            Err(BillingError::WebhookSignatureInvalid)
        ));
        assert!(matches!(
            service
                .solidgate_webhooks
                .verify_event(&body, Some("someone_else"), Some(&signature)),
            Err(BillingError::WebhookSignatureInvalid)
        ));
        assert!(service
            .solidgate_webhooks
            .verify_event(&body, Some(&keys.public_key), Some(&signature))
            .is_ok());
    }
}

#[cfg(test)]
mod customer_and_checkout_tests {
    use std::sync::Arc;

    use transactiq_shared::{Gateway, User, UserStore};

    use crate::checkout::CheckoutArtifact;
    use crate::error::BillingError;
    use crate::plans::PlanTier;
    use crate::solidgate::{decrypt_payment_intent, test_client};
    use crate::testing::{test_service, FakeStripeGateway};

    // =========================================================================
    // Two calls, one gateway customer
    // =========================================================================
    #[tokio::test]
    async fn test_get_or_create_customer_is_stable() {
        let stripe = Arc::new(FakeStripeGateway::new());
        let (service, store) = test_service(stripe.clone(), None);
        let user = User::new("buyer@example.com", "Buyer");
        store.insert(&user).await.unwrap();

        for gateway in [Gateway::Stripe, Gateway::Solidgate] {
            let first = service
                .customer
                .get_or_create_gateway_customer(gateway, &user)
                .await
                .unwrap();
            // Stale copy of the user still resolves to the stored customer
            let second = service
                .customer
                .get_or_create_gateway_customer(gateway, &user)
                .await
                .unwrap();
            assert_eq!(first, second, "{}", gateway);
        }

        assert_eq!(stripe.customers_created(), 1);
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_fake_1"));
        assert!(stored.solidgate_customer_id.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_customer_creation_converges() {
        let stripe = Arc::new(FakeStripeGateway::new());
        let (service, store) = test_service(stripe, None);
        let user = User::new("racer@example.com", "Racer");
        store.insert(&user).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let customers = service.customer.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    customers
                        .get_or_create_gateway_customer(Gateway::Solidgate, &user)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(ids.len(), 1, "every caller sees the same customer");
        assert_eq!(stored.solidgate_customer_id, Some(ids[0].clone()));
    }

    #[tokio::test]
    async fn test_stripe_checkout_redirect() {
        let stripe = Arc::new(FakeStripeGateway::new());
        let (service, store) = test_service(stripe.clone(), None);
        let user = User::new("buyer@example.com", "Buyer");
        store.insert(&user).await.unwrap();

        let artifact = service
            .checkout
            .create_checkout_artifact(Gateway::Stripe, &user, PlanTier::Quarterly)
            .await
            .unwrap();

        let CheckoutArtifact::Redirect { url, session_id } = artifact else {
            panic!("expected a redirect");
        };
        assert_eq!(session_id, "cs_fake_1");
        assert!(url.contains("cus_fake_1"));
        assert!(url.contains("price_quarter"));

        service
            .checkout
            .create_checkout_artifact(Gateway::Stripe, &user, PlanTier::Monthly)
            .await
            .unwrap();
        assert_eq!(stripe.customers_created(), 1, "second checkout reuses the customer");
        assert_eq!(stripe.checkout_sessions(), 2);
    }

    #[tokio::test]
    async fn test_solidgate_checkout_form_data() {
        let stripe = Arc::new(FakeStripeGateway::new());
        let (service, store) = test_service(stripe.clone(), None);
        let user = User::new("buyer@example.com", "Buyer");
        store.insert(&user).await.unwrap();

        let artifact = service
            .checkout
            .create_checkout_artifact(Gateway::Solidgate, &user, PlanTier::Annual)
            .await
            .unwrap();

        let CheckoutArtifact::FormMerchantData(data) = artifact else {
            panic!("expected form merchant data");
        };
        assert_eq!(data.merchant, "api_pk_test");
        assert!(!data.signature.is_empty());

        let intent = decrypt_payment_intent(&test_client(None), &data.payment_intent);
        assert_eq!(intent["product_id"], "sg_year");
        assert_eq!(
            intent["success_url"],
            "https://app.transactiq.test/dashboard/billing?status=approved&plan_id=3"
        );
        assert_eq!(stripe.customers_created(), 0, "no Stripe call on the Solidgate path");
    }

    #[tokio::test]
    async fn test_gateway_failure_stores_nothing() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::failing()), None);
        let user = User::new("buyer@example.com", "Buyer");
        store.insert(&user).await.unwrap();

        let result = service
            .checkout
            .create_checkout_artifact(Gateway::Stripe, &user, PlanTier::Monthly)
            .await;

        assert!(matches!(result, Err(BillingError::StripeApi(_))));
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.stripe_customer_id.is_none());
    }

    #[tokio::test]
    async fn test_checkout_for_missing_user() {
        let (service, _store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let user = User::new("nobody@example.com", "Nobody");

        let result = service
            .checkout
            .create_checkout_artifact(Gateway::Solidgate, &user, PlanTier::Monthly)
            .await;
        assert!(matches!(result, Err(BillingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_portal_requires_stripe_customer() {
        let (service, store) = test_service(Arc::new(FakeStripeGateway::new()), None);
        let mut user = User::new("buyer@example.com", "Buyer");

        assert!(matches!(
            service.portal.create_portal_session(&user).await,
            Err(BillingError::CustomerNotFound(_))
        ));

        user.stripe_customer_id = Some("cus_portal".to_string());
        store.insert(&user).await.unwrap();
        let portal = service.portal.create_portal_session(&user).await.unwrap();
        assert!(portal.url.contains("cus_portal"));
        assert!(portal
            .url
            .ends_with("https://app.transactiq.test/dashboard/billing"));
    }
}
