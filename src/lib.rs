pub mod config;
pub mod domain {
    pub mod donation;
    pub mod method;
    pub mod partner;
    pub mod subscription;
    pub mod transaction;
}
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod charges;
        pub mod methods;
        pub mod ops;
        pub mod partners;
        pub mod subscriptions;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
        pub mod rate_limit;
    }
}
pub mod repo {
    pub mod donations_repo;
    pub mod event_log_repo;
    pub mod partner_merchants_repo;
    pub mod partner_payouts_repo;
    pub mod payment_methods_repo;
    pub mod subscriptions_repo;
    pub mod transactions_repo;
    pub mod webhook_events_repo;
}
pub mod service {
    pub mod charge_service;
    pub mod partner_service;
    pub mod reconciliation;
    pub mod subscription_service;
    pub mod webhook_service;
}

#[derive(Clone)]
pub struct AppState {
    pub charge_service: service::charge_service::ChargeService,
    pub webhook_service: service::webhook_service::WebhookService,
    pub subscription_service: service::subscription_service::SubscriptionService,
    pub partner_service: service::partner_service::PartnerService,
    pub reconciliation: service::reconciliation::ReconciliationSweep,
    pub payment_methods_repo: repo::payment_methods_repo::PaymentMethodsRepo,
    pub transactions_repo: repo::transactions_repo::TransactionsRepo,
    pub subscriptions_repo: repo::subscriptions_repo::SubscriptionsRepo,
    pub pool: sqlx::PgPool,
    pub redis_client: redis::Client,
}
