use crate::domain::donation::donation_status_for;
use crate::domain::method::{fee_for, validate_amount, AmountError};
use crate::domain::partner::is_routable;
use crate::domain::subscription::AutopaymentSubscription;
use crate::domain::transaction::{
    err, CreateChargeRequest, CreateChargeResponse, ErrorEnvelope, TransactionStatus,
};
use crate::gateways::{ChargeRequest, GatewayChargeStatus, GatewayError, GatewayRegistry};
use crate::repo::donations_repo::{DonationsRepo, NewDonation};
use crate::repo::event_log_repo::EventLogRepo;
use crate::repo::partner_merchants_repo::PartnerMerchantsRepo;
use crate::repo::payment_methods_repo::PaymentMethodsRepo;
use crate::repo::subscriptions_repo::SubscriptionsRepo;
use crate::repo::transactions_repo::{NewTransaction, TransactionsRepo};
use crate::service::partner_service::routing_transfers;
use crate::service::subscription_service::build_registration;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use sqlx::PgPool;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Outcome of a scheduler-driven charge. The subscription engine records
/// success/failure counters from this; the charge itself is a normal ledger
/// row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurringOutcome {
    Completed,
    Pending,
    Failed,
}

#[derive(Clone)]
pub struct ChargeService {
    pub pool: PgPool,
    pub transactions_repo: TransactionsRepo,
    pub donations_repo: DonationsRepo,
    pub event_log_repo: EventLogRepo,
    pub payment_methods_repo: PaymentMethodsRepo,
    pub partner_merchants_repo: PartnerMerchantsRepo,
    pub subscriptions_repo: SubscriptionsRepo,
    pub registry: GatewayRegistry,
    /// Donor-facing charges that never confirm are cancelled by the sweep
    /// once this window passes.
    pub charge_expiry_minutes: i64,
}

impl ChargeService {
    pub async fn create(
        &self,
        req: CreateChargeRequest,
        headers: HeaderMap,
    ) -> Result<CreateChargeResponse, (StatusCode, ErrorEnvelope)> {
        let idempotency_key = headers
            .get("Idempotency-Key")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    err("missing_idempotency_key", "Idempotency-Key header is required"),
                )
            })?;

        let request_hash = hash_request(&req);
        if let Some(found) = self
            .transactions_repo
            .find_by_idempotency(req.organization_id, &idempotency_key)
            .await
            .map_err(internal)?
        {
            if found.request_hash.as_deref() != Some(request_hash.as_str()) {
                return Err((
                    StatusCode::CONFLICT,
                    err(
                        "idempotency_key_reused",
                        "payload does not match the original request for this key",
                    ),
                ));
            }
            return Ok(CreateChargeResponse {
                transaction_id: found.transaction_id,
                status: TransactionStatus::parse(&found.status).unwrap_or(TransactionStatus::Pending),
                payment_url: found.payment_url,
                qr_payload: found.qr_payload,
            });
        }

        let cfg = self
            .payment_methods_repo
            .find_by_slug(&req.method_slug)
            .await
            .map_err(internal)?
            .ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    err("unknown_method", "no payment method with this slug"),
                )
            })?;

        validate_amount(&cfg, req.amount_minor).map_err(|e| {
            let message = match e {
                AmountError::NonPositive => "amount must be positive",
                AmountError::BelowMin => "amount below the method minimum",
                AmountError::AboveMax => "amount above the method maximum",
                AmountError::MethodInactive => "payment method is disabled",
            };
            (StatusCode::BAD_REQUEST, err("invalid_amount", message))
        })?;

        let mut resolved = self.registry.resolve(&cfg).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                err("unknown_method", "payment method is not backed by a registered gateway"),
            )
        })?;

        // Split-payment routing for organizations onboarded as sub-merchants.
        // Purely additive to the gateway settings; a blocked or incomplete
        // merchant falls back to platform default settlement.
        if let Some(merchant) = self
            .partner_merchants_repo
            .active_for_org(req.organization_id)
            .await
            .map_err(internal)?
        {
            if is_routable(&merchant) {
                if let Some(transfers) = routing_transfers(&merchant, req.amount_minor, &req.currency) {
                    resolved.settings.insert("transfers".to_string(), transfers);
                }
            }
        }

        let transaction_id = Uuid::new_v4();
        let input = NewTransaction {
            id: transaction_id,
            organization_id: req.organization_id,
            fundraiser_id: req.fundraiser_id,
            project_id: req.project_id,
            project_stage_id: req.project_stage_id,
            method_config_id: Some(cfg.id),
            method_slug: cfg.slug.clone(),
            idempotency_key: Some(idempotency_key),
            request_hash: Some(request_hash),
            amount_minor: req.amount_minor,
            currency: req.currency.clone(),
            fee_minor: fee_for(&cfg, req.amount_minor),
            recurring: req.recurring,
            recurring_period: req.recurring_period,
            subscription_key: None,
            return_url: req.return_url.clone(),
            success_url: req.success_url.clone(),
            failure_url: req.failure_url.clone(),
            expires_at: Some(chrono::Utc::now() + chrono::Duration::minutes(self.charge_expiry_minutes)),
        };

        let client_ip = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        // The ledger row, its donor projection and the audit entry commit
        // together before the gateway sees anything.
        let mut db_tx = self.pool.begin().await.map_err(|e| internal(e.into()))?;
        TransactionsRepo::insert_pending_tx(&mut db_tx, &input)
            .await
            .map_err(internal)?;
        DonationsRepo::insert_tx(
            &mut db_tx,
            &NewDonation {
                id: Uuid::new_v4(),
                transaction_id,
                organization_id: req.organization_id,
                donor_name: if req.donor.anonymous { None } else { req.donor.name.clone() },
                donor_email: req.donor.email.clone(),
                anonymous: req.donor.anonymous,
                message: req.donor.message.clone(),
                wants_receipt: req.donor.wants_receipt,
                amount_minor: req.amount_minor,
                currency: req.currency.clone(),
            },
        )
        .await
        .map_err(internal)?;
        EventLogRepo::append_in_tx(
            &mut db_tx,
            transaction_id,
            "created",
            "info",
            "transaction created",
            serde_json::json!({
                "method_slug": cfg.slug,
                "amount_minor": req.amount_minor,
                "client_ip": client_ip,
                "user_agent": user_agent,
            }),
        )
        .await
        .map_err(internal)?;
        db_tx.commit().await.map_err(|e| internal(e.into()))?;

        let gateway_request = ChargeRequest {
            amount_minor: req.amount_minor,
            currency: req.currency.clone(),
            idempotency_key: transaction_id,
            description: format!("Donation {}", transaction_id),
            settings: resolved.settings,
            saved_method_token: None,
            save_payment_method: req.recurring,
            return_url: req.return_url.clone(),
        };

        match resolved.gateway.charge(&gateway_request).await {
            Ok(result) => {
                self.transactions_repo
                    .record_gateway_result(
                        transaction_id,
                        Some(&result.external_id),
                        result.confirmation_url.as_deref(),
                        result.qr_payload.as_deref(),
                        result.raw.clone(),
                    )
                    .await
                    .map_err(internal)?;

                let status = match result.status {
                    GatewayChargeStatus::Succeeded => {
                        self.complete_synchronously(transaction_id, result.payment_method_token.as_deref())
                            .await
                            .map_err(internal)?;
                        TransactionStatus::Completed
                    }
                    GatewayChargeStatus::Rejected => {
                        self.fail_synchronously(transaction_id, "gateway_rejected", "rejected in gateway response")
                            .await
                            .map_err(internal)?;
                        return Err((
                            StatusCode::UNPROCESSABLE_ENTITY,
                            err("gateway_rejected", "the payment was declined"),
                        ));
                    }
                    GatewayChargeStatus::Pending => TransactionStatus::Pending,
                };

                Ok(CreateChargeResponse {
                    transaction_id,
                    status,
                    payment_url: result.confirmation_url,
                    qr_payload: result.qr_payload,
                })
            }
            Err(GatewayError::Rejected { code, message }) => {
                self.fail_synchronously(transaction_id, &code, &message)
                    .await
                    .map_err(internal)?;
                Err((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    err("gateway_rejected", "the payment was declined"),
                ))
            }
            Err(GatewayError::Unavailable(reason)) => {
                // Never speculatively failed: the charge may still succeed
                // gateway-side. The row stays pending for the webhook or the
                // reconciliation sweep.
                self.event_log_repo
                    .append(
                        transaction_id,
                        "gateway_unavailable",
                        "warning",
                        &reason,
                        serde_json::Value::Null,
                        client_ip.as_deref(),
                        user_agent.as_deref(),
                    )
                    .await
                    .map_err(internal)?;
                tracing::warn!(%transaction_id, %reason, "gateway unavailable, charge left pending");

                Ok(CreateChargeResponse {
                    transaction_id,
                    status: TransactionStatus::Pending,
                    payment_url: None,
                    qr_payload: None,
                })
            }
            Err(e) => Err(internal(e.into())),
        }
    }

    /// Scheduler-driven charge reusing a saved credential. No donor
    /// interaction, no redirect; the resulting transaction is tagged with
    /// the subscription key so the completion hook can update counters.
    pub async fn create_recurring_charge(
        &self,
        sub: &AutopaymentSubscription,
    ) -> anyhow::Result<(Uuid, RecurringOutcome)> {
        let cfg = self
            .payment_methods_repo
            .find_by_slug(&sub.method_slug)
            .await?
            .ok_or_else(|| anyhow::anyhow!("method '{}' gone for subscription {}", sub.method_slug, sub.id))?;

        let resolved = self.registry.resolve(&cfg)?;

        let transaction_id = Uuid::new_v4();
        let input = NewTransaction {
            id: transaction_id,
            organization_id: sub.organization_id,
            fundraiser_id: None,
            project_id: None,
            project_stage_id: None,
            method_config_id: Some(cfg.id),
            method_slug: cfg.slug.clone(),
            idempotency_key: None,
            request_hash: None,
            amount_minor: sub.amount_minor,
            currency: sub.currency.clone(),
            fee_minor: fee_for(&cfg, sub.amount_minor),
            recurring: true,
            recurring_period: Some(sub.period),
            subscription_key: Some(sub.subscription_key.clone()),
            return_url: None,
            success_url: None,
            failure_url: None,
            expires_at: None,
        };

        let mut db_tx = self.pool.begin().await?;
        TransactionsRepo::insert_pending_tx(&mut db_tx, &input).await?;
        DonationsRepo::insert_tx(
            &mut db_tx,
            &NewDonation {
                id: Uuid::new_v4(),
                transaction_id,
                organization_id: sub.organization_id,
                donor_name: Some(sub.title.clone()),
                donor_email: None,
                anonymous: false,
                message: None,
                wants_receipt: false,
                amount_minor: sub.amount_minor,
                currency: sub.currency.clone(),
            },
        )
        .await?;
        EventLogRepo::append_in_tx(
            &mut db_tx,
            transaction_id,
            "recurring_charge",
            "info",
            "scheduled autopayment charge",
            serde_json::json!({ "subscription_id": sub.id }),
        )
        .await?;
        db_tx.commit().await?;

        let gateway_request = ChargeRequest {
            amount_minor: sub.amount_minor,
            currency: sub.currency.clone(),
            idempotency_key: transaction_id,
            description: format!("Autopayment {}", sub.title),
            settings: resolved.settings,
            saved_method_token: Some(sub.subscription_key.clone()),
            save_payment_method: false,
            return_url: None,
        };

        match resolved.gateway.charge(&gateway_request).await {
            Ok(result) => {
                self.transactions_repo
                    .record_gateway_result(transaction_id, Some(&result.external_id), None, None, result.raw.clone())
                    .await?;

                match result.status {
                    GatewayChargeStatus::Succeeded => {
                        self.complete_synchronously(transaction_id, None).await?;
                        Ok((transaction_id, RecurringOutcome::Completed))
                    }
                    GatewayChargeStatus::Pending => Ok((transaction_id, RecurringOutcome::Pending)),
                    GatewayChargeStatus::Rejected => {
                        self.fail_synchronously(transaction_id, "gateway_rejected", "recurring charge rejected")
                            .await?;
                        Ok((transaction_id, RecurringOutcome::Failed))
                    }
                }
            }
            Err(GatewayError::Rejected { code, message }) => {
                self.fail_synchronously(transaction_id, &code, &message).await?;
                Ok((transaction_id, RecurringOutcome::Failed))
            }
            Err(GatewayError::Unavailable(reason)) => {
                self.event_log_repo
                    .append(
                        transaction_id,
                        "gateway_unavailable",
                        "warning",
                        &reason,
                        serde_json::Value::Null,
                        None,
                        None,
                    )
                    .await?;
                Ok((transaction_id, RecurringOutcome::Pending))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_synchronously(&self, transaction_id: Uuid, token: Option<&str>) -> anyhow::Result<()> {
        let applied = self
            .transactions_repo
            .apply_status(transaction_id, TransactionStatus::Completed)
            .await?;
        if applied == 0 {
            return Ok(());
        }

        self.donations_repo
            .sync_status(transaction_id, donation_status_for(TransactionStatus::Completed))
            .await?;
        self.event_log_repo
            .append(
                transaction_id,
                "completed",
                "info",
                "completed in synchronous gateway response",
                serde_json::Value::Null,
                None,
                None,
            )
            .await?;

        if let Some(token) = token {
            self.transactions_repo
                .record_payment_details(transaction_id, serde_json::json!({ "payment_method_token": token }))
                .await?;
            if let Some(tx) = self.transactions_repo.find_by_id(transaction_id).await? {
                if let Some(reg) = build_registration(&tx, token) {
                    self.transactions_repo
                        .attach_subscription_key(transaction_id, token)
                        .await?;
                    self.subscriptions_repo.upsert_registration(&reg).await?;
                }
            }
        }

        Ok(())
    }

    async fn fail_synchronously(&self, transaction_id: Uuid, code: &str, message: &str) -> anyhow::Result<()> {
        let applied = self
            .transactions_repo
            .apply_status(transaction_id, TransactionStatus::Failed)
            .await?;
        if applied > 0 {
            self.donations_repo
                .sync_status(transaction_id, donation_status_for(TransactionStatus::Failed))
                .await?;
        }
        self.event_log_repo
            .append(
                transaction_id,
                "gateway_rejected",
                "warning",
                message,
                serde_json::json!({ "code": code }),
                None,
                None,
            )
            .await?;

        Ok(())
    }
}

fn hash_request(req: &CreateChargeRequest) -> String {
    let s = serde_json::to_string(req).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn internal(e: anyhow::Error) -> (StatusCode, ErrorEnvelope) {
    (StatusCode::INTERNAL_SERVER_ERROR, err("internal_error", &e.to_string()))
}
