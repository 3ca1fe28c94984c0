//! The earnings service: payout requests, sale recording and balances.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use yalls_commission::rates::tier_share;
use yalls_commission::{
    aggregate_residuals, attribute_split, rank_progress, split_commission, CommissionCredit,
    CommissionError, CommissionSplit, DownlineTransaction, MemberStats, Rank, RankProgress,
    RankRequirement, UplineChain, MAX_UPLINE_DEPTH,
};
use yalls_store::{
    DownlineMember, PayoutRecord, PayoutStore, Referral, ResidualRecord, ResidualStore,
    StoreError, UplineDirectory,
};
use yalls_types::{
    Clock, IdempotencyKey, Money, PayoutGateway, PayoutId, PayoutStatus, ResidualId, Timestamp,
    UserId,
};
use yalls_utils::StatsCounter;

use crate::config::EarningsConfig;
use crate::retry::RetryPolicy;
use crate::EarningsError;

/// Names of the counters the service maintains.
pub mod counters {
    pub const PAYOUTS_REQUESTED: &str = "payouts_requested";
    pub const PAYOUTS_DEDUPLICATED: &str = "payouts_deduplicated";
    pub const STORE_RETRIES: &str = "store_retries";
    pub const SALES_RECORDED: &str = "sales_recorded";

    pub const ALL: [&str; 4] = [
        PAYOUTS_REQUESTED,
        PAYOUTS_DEDUPLICATED,
        STORE_RETRIES,
        SALES_RECORDED,
    ];
}

/// Levels walked by [`EarningsService::fetch_downline`] when the caller has
/// no preference.
pub const DEFAULT_TREE_DEPTH: u32 = 5;

/// Storage handles the service works against.
#[derive(Clone)]
pub struct Stores {
    pub payouts: Arc<dyn PayoutStore + Send + Sync>,
    pub residuals: Arc<dyn ResidualStore + Send + Sync>,
    pub uplines: Arc<dyn UplineDirectory + Send + Sync>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: PayoutStore + ResidualStore + UplineDirectory + Send + Sync + 'static,
    {
        Self {
            payouts: store.clone(),
            residuals: store.clone(),
            uplines: store,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutRequest {
    pub user_id: UserId,
    pub amount: Money,
    /// Falls back to the configured default gateway.
    pub gateway: Option<PayoutGateway>,
    /// Client token; repeating a request with the same token returns the
    /// originally created record.
    pub idempotency_key: Option<IdempotencyKey>,
}

impl PayoutRequest {
    pub fn new(user_id: UserId, amount: Money) -> Self {
        Self {
            user_id,
            amount,
            gateway: None,
            idempotency_key: None,
        }
    }

    pub fn with_gateway(mut self, gateway: PayoutGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Outcome of recording one sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub user_id: UserId,
    pub split: CommissionSplit,
    pub credits: Vec<CommissionCredit>,
    pub recorded_at: Timestamp,
}

/// One commission earned from a downline sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub id: ResidualId,
    pub source: UserId,
    pub tier: u8,
    pub sale_amount: Money,
    /// The earner's share of `sale_amount`, rounded to cents.
    pub amount: Money,
    pub created_at: Timestamp,
}

impl CommissionEntry {
    fn from_record(record: ResidualRecord) -> Result<Option<Self>, CommissionError> {
        let Some(share) = tier_share(record.upline_position) else {
            return Ok(None);
        };
        let amount = record
            .amount
            .checked_mul_rate(share)
            .ok_or(CommissionError::Overflow)?
            .round_cents();
        Ok(Some(Self {
            id: record.id,
            source: record.source,
            tier: record.upline_position,
            sale_amount: record.amount,
            amount,
            created_at: record.created_at,
        }))
    }
}

pub struct EarningsService {
    stores: Stores,
    clock: Arc<dyn Clock>,
    default_gateway: PayoutGateway,
    retry: RetryPolicy,
    stats: Arc<StatsCounter>,
}

impl EarningsService {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, config: &EarningsConfig) -> Self {
        Self {
            stores,
            clock,
            default_gateway: config.default_gateway,
            retry: RetryPolicy::from(config),
            stats: Arc::new(StatsCounter::new(&counters::ALL)),
        }
    }

    pub fn stats(&self) -> &Arc<StatsCounter> {
        &self.stats
    }

    /// Create a `pending` payout and return it once the store has committed it.
    ///
    /// The record id is fixed before the first attempt, so retries after a
    /// transient failure or timeout cannot produce a second record.
    pub async fn request_payout(
        &self,
        request: PayoutRequest,
    ) -> Result<PayoutRecord, EarningsError> {
        if !request.amount.is_positive() || !request.amount.is_whole_cents() {
            return Err(EarningsError::InvalidPayoutAmount(request.amount));
        }

        let record = PayoutRecord::pending(
            request.user_id,
            request.amount,
            request.gateway.unwrap_or(self.default_gateway),
            self.clock.now(),
            request.idempotency_key,
        );
        let requested_id = record.id;

        let payouts = Arc::clone(&self.stores.payouts);
        let stored = self
            .retry
            .run(&self.stats, "insert_payout", move || {
                payouts.insert_payout(&record)
            })
            .await?;

        self.stats.increment(counters::PAYOUTS_REQUESTED);
        if stored.id != requested_id {
            self.stats.increment(counters::PAYOUTS_DEDUPLICATED);
            tracing::info!(
                payout_id = %stored.id,
                user = %stored.user_id,
                "payout request matched an earlier idempotency key"
            );
        } else {
            tracing::info!(
                payout_id = %stored.id,
                user = %stored.user_id,
                amount = %stored.amount,
                gateway = %stored.gateway,
                "payout requested"
            );
        }
        Ok(stored)
    }

    /// Total residual earnings of `user`.
    pub async fn fetch_residuals(&self, user: &UserId) -> Result<Money, EarningsError> {
        let records = self.residual_records(user).await?;
        let entries: Vec<DownlineTransaction> = records
            .iter()
            .map(|r| DownlineTransaction::new(r.amount, r.upline_position))
            .collect();
        Ok(aggregate_residuals(&entries)?)
    }

    /// Individual commissions earned by `user`, newest first, at most
    /// `limit` of them.
    pub async fn fetch_commissions(
        &self,
        user: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<CommissionEntry>, EarningsError> {
        let residuals = Arc::clone(&self.stores.residuals);
        let earner = user.clone();
        let records = self
            .retry
            .run(&self.stats, "recent_residuals", move || {
                residuals.recent_residuals(&earner, limit)
            })
            .await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            if let Some(entry) = CommissionEntry::from_record(record)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Payout history of `user`, newest first.
    pub async fn fetch_payouts(&self, user: &UserId) -> Result<Vec<PayoutRecord>, EarningsError> {
        let payouts = Arc::clone(&self.stores.payouts);
        let user = user.clone();
        self.retry
            .run(&self.stats, "payouts_for_user", move || {
                payouts.payouts_for_user(&user)
            })
            .await
    }

    /// Residual earnings not yet claimed by a pending, processing or
    /// completed payout.
    pub async fn available_balance(&self, user: &UserId) -> Result<Money, EarningsError> {
        let earned = self.fetch_residuals(user).await?;
        let claimed = self
            .fetch_payouts(user)
            .await?
            .iter()
            .filter(|p| p.status.holds_funds())
            .try_fold(Money::ZERO, |acc, p| acc.checked_add(p.amount))
            .ok_or(CommissionError::Overflow)?;
        Ok(earned
            .checked_sub(claimed)
            .ok_or(CommissionError::Overflow)?)
    }

    /// Record `referrer` as the direct referrer of `user`.
    pub async fn register_referral(
        &self,
        user: &UserId,
        referrer: &UserId,
    ) -> Result<(), EarningsError> {
        if user == referrer {
            return Err(EarningsError::InvalidReferral(format!(
                "{user} cannot refer themselves"
            )));
        }
        let referrer_upline = self.upline_of(referrer, MAX_UPLINE_DEPTH).await?;
        if referrer_upline.contains(user) {
            return Err(EarningsError::InvalidReferral(format!(
                "{user} is already in the upline of {referrer}"
            )));
        }

        let uplines = Arc::clone(&self.stores.uplines);
        let referral = Referral {
            user: user.clone(),
            referrer: referrer.clone(),
            enrolled_at: self.clock.now(),
        };
        let result = self
            .retry
            .run(&self.stats, "set_referrer", move || uplines.set_referrer(&referral))
            .await;

        match result {
            Ok(()) => {}
            Err(EarningsError::Persistence(StoreError::Duplicate(_))) => {
                // A timed-out earlier attempt may have landed the same link.
                let current = self.referrer_of(user).await?;
                if current.as_ref() != Some(referrer) {
                    return Err(EarningsError::InvalidReferral(format!(
                        "{user} already has a referrer"
                    )));
                }
            }
            Err(err) => return Err(err),
        }
        tracing::info!(user = %user, referrer = %referrer, "referral registered");
        Ok(())
    }

    /// Members `user` enrolled directly, most recent first.
    pub async fn direct_referrals(&self, user: &UserId) -> Result<Vec<Referral>, EarningsError> {
        let uplines = Arc::clone(&self.stores.uplines);
        let user = user.clone();
        self.retry
            .run(&self.stats, "direct_referrals", move || {
                uplines.direct_referrals(&user)
            })
            .await
    }

    /// The referral tree below `user`, `max_depth` levels deep.
    pub async fn fetch_downline(
        &self,
        user: &UserId,
        max_depth: u32,
    ) -> Result<Vec<DownlineMember>, EarningsError> {
        let uplines = Arc::clone(&self.stores.uplines);
        let user = user.clone();
        self.retry
            .run(&self.stats, "downline", move || uplines.downline(&user, max_depth))
            .await
    }

    /// Standing of `user` for rank evaluation.
    ///
    /// Team volume sums the downline sales `user` earned residuals on and
    /// active downline counts the distinct members behind them. Personal
    /// volume and the current rank are supplied by the caller.
    pub async fn member_stats(
        &self,
        user: &UserId,
        current_rank: Rank,
        personal_volume: Money,
    ) -> Result<MemberStats, EarningsError> {
        let direct = self.direct_referrals(user).await?;
        let records = self.residual_records(user).await?;
        let team_volume = records
            .iter()
            .try_fold(Money::ZERO, |acc, r| acc.checked_add(r.amount))
            .ok_or(CommissionError::Overflow)?;
        let active: HashSet<&UserId> = records.iter().map(|r| &r.source).collect();

        Ok(MemberStats {
            user_id: user.clone(),
            current_rank,
            personal_volume_cents: personal_volume.to_cents().ok_or(CommissionError::Overflow)?,
            team_volume_cents: team_volume.to_cents().ok_or(CommissionError::Overflow)?,
            direct_referrals: direct.len() as u32,
            active_downline: active.len() as u32,
        })
    }

    /// Progress of `user` toward the rank above `current_rank`.
    pub async fn rank_progress(
        &self,
        user: &UserId,
        current_rank: Rank,
        personal_volume: Money,
        requirements: &[RankRequirement],
    ) -> Result<RankProgress, EarningsError> {
        let stats = self.member_stats(user, current_rank, personal_volume).await?;
        rank_progress(&stats, requirements)
            .ok_or_else(|| CommissionError::UnknownRank(current_rank.to_string()).into())
    }

    /// Split a sale by `user` across their upline and persist one residual
    /// ledger row per credited tier.
    pub async fn record_sale(
        &self,
        user: &UserId,
        amount: Money,
    ) -> Result<SaleReceipt, EarningsError> {
        let upline = self.upline_of(user, MAX_UPLINE_DEPTH).await?;
        let chain = UplineChain::for_user(user, upline)?;
        let split = split_commission(amount, &chain)?;
        let credits = attribute_split(&split, &chain);
        let recorded_at = self.clock.now();

        let rows: Vec<ResidualRecord> = credits
            .iter()
            .map(|credit| ResidualRecord {
                id: ResidualId::generate(),
                earner: credit.earner.clone(),
                source: user.clone(),
                amount,
                upline_position: credit.tier,
                created_at: recorded_at,
            })
            .collect();

        if !rows.is_empty() {
            let residuals = Arc::clone(&self.stores.residuals);
            self.retry
                .run(&self.stats, "put_residuals", move || {
                    residuals.put_residuals(&rows)
                })
                .await?;
        }

        self.stats.increment(counters::SALES_RECORDED);
        tracing::info!(
            user = %user,
            amount = %amount,
            credited_tiers = credits.len(),
            "sale recorded"
        );
        Ok(SaleReceipt {
            user_id: user.clone(),
            split,
            credits,
            recorded_at,
        })
    }

    /// Advance a payout through its lifecycle.
    pub async fn settle_payout(
        &self,
        id: &PayoutId,
        next: PayoutStatus,
    ) -> Result<PayoutRecord, EarningsError> {
        let current = self.get_payout(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(EarningsError::InvalidStatusTransition {
                id: *id,
                from: current.status,
                to: next,
            });
        }

        let payouts = Arc::clone(&self.stores.payouts);
        let payout_id = *id;
        let result = self
            .retry
            .run(&self.stats, "update_payout_status", move || {
                payouts.update_payout_status(&payout_id, next)
            })
            .await;

        let updated = match result {
            Ok(record) => record,
            Err(EarningsError::Persistence(StoreError::Conflict(_))) => {
                let latest = self.get_payout(id).await?;
                if latest.status != next {
                    return Err(EarningsError::InvalidStatusTransition {
                        id: *id,
                        from: latest.status,
                        to: next,
                    });
                }
                latest
            }
            Err(err) => return Err(err),
        };
        tracing::info!(payout_id = %id, from = %current.status, to = %next, "payout settled");
        Ok(updated)
    }

    async fn get_payout(&self, id: &PayoutId) -> Result<PayoutRecord, EarningsError> {
        let payouts = Arc::clone(&self.stores.payouts);
        let id = *id;
        self.retry
            .run(&self.stats, "get_payout", move || payouts.get_payout(&id))
            .await
    }

    async fn residual_records(&self, user: &UserId) -> Result<Vec<ResidualRecord>, EarningsError> {
        let residuals = Arc::clone(&self.stores.residuals);
        let user = user.clone();
        self.retry
            .run(&self.stats, "residuals_for_user", move || {
                residuals.residuals_for_user(&user)
            })
            .await
    }

    async fn referrer_of(&self, user: &UserId) -> Result<Option<UserId>, EarningsError> {
        let uplines = Arc::clone(&self.stores.uplines);
        let user = user.clone();
        self.retry
            .run(&self.stats, "referrer_of", move || uplines.referrer_of(&user))
            .await
    }

    async fn upline_of(&self, user: &UserId, depth: usize) -> Result<Vec<UserId>, EarningsError> {
        let uplines = Arc::clone(&self.stores.uplines);
        let user = user.clone();
        self.retry
            .run(&self.stats, "upline_chain", move || {
                uplines.upline_chain(&user, depth)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use yalls_nullables::{NullClock, NullStore};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn fast_config() -> EarningsConfig {
        EarningsConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            write_timeout_ms: 100,
            default_gateway: PayoutGateway::Stripe,
        }
    }

    fn service_with(config: &EarningsConfig) -> (Arc<NullStore>, Arc<NullClock>, EarningsService) {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(1_000));
        let service = EarningsService::new(Stores::shared(Arc::clone(&store)), clock.clone(), config);
        (store, clock, service)
    }

    fn service() -> (Arc<NullStore>, Arc<NullClock>, EarningsService) {
        service_with(&fast_config())
    }

    #[tokio::test]
    async fn payout_is_created_pending() {
        let (store, _clock, service) = service();
        let record = service
            .request_payout(PayoutRequest::new(uid("alice"), money("25.00")))
            .await
            .unwrap();

        assert_eq!(record.status, PayoutStatus::Pending);
        assert_eq!(record.gateway, PayoutGateway::Stripe);
        assert_eq!(record.created_at, Timestamp::from_millis(1_000));
        assert_eq!(store.get_payout(&record.id).unwrap(), record);
        assert_eq!(service.stats().get(counters::PAYOUTS_REQUESTED), 1);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let (store, _clock, service) = service();
        for amount in ["0", "-5.00"] {
            let err = service
                .request_payout(PayoutRequest::new(uid("alice"), money(amount)))
                .await
                .unwrap_err();
            assert!(matches!(err, EarningsError::InvalidPayoutAmount(_)));
        }
        assert_eq!(store.payout_count().unwrap(), 0);
        assert_eq!(store.write_attempts(), 0);
    }

    #[tokio::test]
    async fn sub_cent_amounts_are_rejected() {
        let (store, _clock, service) = service();
        for amount in ["0.001", "10.005"] {
            let err = service
                .request_payout(PayoutRequest::new(uid("alice"), money(amount)))
                .await
                .unwrap_err();
            assert!(matches!(err, EarningsError::InvalidPayoutAmount(_)));
        }
        assert_eq!(store.write_attempts(), 0);

        // Trailing zeros are still whole cents.
        service
            .request_payout(PayoutRequest::new(uid("alice"), money("10.500")))
            .await
            .unwrap();
        assert_eq!(store.payout_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn repeated_key_returns_first_record() {
        let (store, clock, service) = service();
        let key = IdempotencyKey::new("req-42").unwrap();
        let request = PayoutRequest::new(uid("alice"), money("10.00"))
            .with_gateway(PayoutGateway::Venmo)
            .with_idempotency_key(key);

        let first = service.request_payout(request.clone()).await.unwrap();
        clock.advance(5_000);
        let second = service.request_payout(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.payout_count().unwrap(), 1);
        assert_eq!(service.stats().get(counters::PAYOUTS_DEDUPLICATED), 1);
    }

    #[tokio::test]
    async fn transient_failures_within_budget_succeed_once() {
        let (store, _clock, service) = service();
        store.fail_next_writes(2);
        service
            .request_payout(PayoutRequest::new(uid("alice"), money("10.00")))
            .await
            .unwrap();
        assert_eq!(store.payout_count().unwrap(), 1);
        assert_eq!(store.write_attempts(), 3);
        assert_eq!(service.stats().get(counters::STORE_RETRIES), 2);
    }

    #[tokio::test]
    async fn transient_failures_beyond_budget_surface() {
        let (store, _clock, service) = service();
        store.fail_next_writes(4);
        let err = service
            .request_payout(PayoutRequest::new(uid("alice"), money("10.00")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EarningsError::Persistence(StoreError::Unavailable(_))
        ));
        assert_eq!(store.payout_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn timed_out_write_then_retry_leaves_one_record() {
        let (store, _clock, service) = service();
        store.delay_next_writes(1, Duration::from_millis(300));
        let record = service
            .request_payout(PayoutRequest::new(uid("alice"), money("10.00")))
            .await
            .unwrap();

        // Let the abandoned first attempt finish.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let stored = store.payouts_for_user(&uid("alice")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, record.id);
        assert_eq!(store.write_attempts(), 2);
    }

    #[tokio::test]
    async fn exhausted_timeouts_are_safe_to_retry_with_key() {
        let config = EarningsConfig {
            max_retries: 2,
            write_timeout_ms: 30,
            ..fast_config()
        };
        let (store, _clock, service) = service_with(&config);
        store.delay_next_writes(3, Duration::from_millis(150));
        let request = PayoutRequest::new(uid("alice"), money("10.00"))
            .with_idempotency_key(IdempotencyKey::new("k").unwrap());

        let err = service.request_payout(request.clone()).await.unwrap_err();
        assert!(matches!(err, EarningsError::PersistenceTimeout { attempts: 3 }));

        let retried = service.request_payout(request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let stored = store.payouts_for_user(&uid("alice")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, retried.id);
    }

    #[tokio::test]
    async fn late_commit_after_timeout_is_not_reported_unavailable() {
        let (store, _clock, service) = service();
        store.delay_next_writes(1, Duration::from_millis(400));
        store.fail_next_writes(10);
        let err = service
            .request_payout(PayoutRequest::new(uid("alice"), money("10.00")))
            .await
            .unwrap_err();
        assert!(matches!(err, EarningsError::PersistenceTimeout { attempts: 4 }));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.payout_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn payouts_are_listed_newest_first() {
        let (_store, clock, service) = service();
        let mut ids = Vec::new();
        for cents in ["1.00", "2.00", "3.00"] {
            ids.push(
                service
                    .request_payout(PayoutRequest::new(uid("alice"), money(cents)))
                    .await
                    .unwrap()
                    .id,
            );
            clock.advance(10);
        }
        let listed: Vec<PayoutId> = service
            .fetch_payouts(&uid("alice"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.reverse();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn sale_credits_three_tiers() {
        let (store, _clock, service) = service();
        service.register_referral(&uid("d"), &uid("c")).await.unwrap();
        service.register_referral(&uid("c"), &uid("b")).await.unwrap();
        service.register_referral(&uid("b"), &uid("a")).await.unwrap();

        let receipt = service.record_sale(&uid("d"), money("100.00")).await.unwrap();
        assert_eq!(receipt.split.user, money("85.00"));
        assert_eq!(receipt.credits.len(), 3);
        assert_eq!(receipt.credits[0].earner, uid("c"));
        assert_eq!(receipt.credits[2].amount, money("0.60"));

        assert_eq!(service.fetch_residuals(&uid("c")).await.unwrap(), money("10.00"));
        assert_eq!(service.fetch_residuals(&uid("b")).await.unwrap(), money("2.00"));
        assert_eq!(service.fetch_residuals(&uid("a")).await.unwrap(), money("0.60"));
        assert_eq!(store.residuals_for_user(&uid("a")).unwrap()[0].upline_position, 3);
        assert_eq!(service.stats().get(counters::SALES_RECORDED), 1);
    }

    #[tokio::test]
    async fn sale_without_upline_writes_nothing() {
        let (store, _clock, service) = service();
        let receipt = service.record_sale(&uid("solo"), money("50.00")).await.unwrap();
        assert!(receipt.credits.is_empty());
        assert_eq!(receipt.split.upline1, money("5.00"));
        assert_eq!(store.write_attempts(), 0);
    }

    #[tokio::test]
    async fn negative_sale_is_rejected() {
        let (_store, _clock, service) = service();
        let err = service.record_sale(&uid("a"), money("-1")).await.unwrap_err();
        assert!(matches!(
            err,
            EarningsError::Commission(CommissionError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn referral_rules() {
        let (_store, _clock, service) = service();
        assert!(matches!(
            service.register_referral(&uid("a"), &uid("a")).await,
            Err(EarningsError::InvalidReferral(_))
        ));

        service.register_referral(&uid("b"), &uid("a")).await.unwrap();
        assert!(matches!(
            service.register_referral(&uid("b"), &uid("z")).await,
            Err(EarningsError::InvalidReferral(_))
        ));
        // a -> b would close a loop.
        assert!(matches!(
            service.register_referral(&uid("a"), &uid("b")).await,
            Err(EarningsError::InvalidReferral(_))
        ));
    }

    #[tokio::test]
    async fn available_balance_excludes_failed_payouts() {
        let (_store, _clock, service) = service();
        service.register_referral(&uid("buyer"), &uid("alice")).await.unwrap();
        service.record_sale(&uid("buyer"), money("500.00")).await.unwrap();
        assert_eq!(service.available_balance(&uid("alice")).await.unwrap(), money("50.00"));

        let first = service
            .request_payout(PayoutRequest::new(uid("alice"), money("20.00")))
            .await
            .unwrap();
        service
            .request_payout(PayoutRequest::new(uid("alice"), money("5.00")))
            .await
            .unwrap();
        assert_eq!(service.available_balance(&uid("alice")).await.unwrap(), money("25.00"));

        service.settle_payout(&first.id, PayoutStatus::Failed).await.unwrap();
        assert_eq!(service.available_balance(&uid("alice")).await.unwrap(), money("45.00"));
    }

    #[tokio::test]
    async fn settlement_follows_lifecycle() {
        let (_store, _clock, service) = service();
        let record = service
            .request_payout(PayoutRequest::new(uid("alice"), money("10.00")))
            .await
            .unwrap();

        let err = service
            .settle_payout(&record.id, PayoutStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EarningsError::InvalidStatusTransition {
                from: PayoutStatus::Pending,
                to: PayoutStatus::Completed,
                ..
            }
        ));

        service
            .settle_payout(&record.id, PayoutStatus::Processing)
            .await
            .unwrap();
        let done = service
            .settle_payout(&record.id, PayoutStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, PayoutStatus::Completed);
        assert!(service
            .settle_payout(&record.id, PayoutStatus::Failed)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn residual_overflow_is_an_error() {
        let (store, _clock, service) = service();
        let huge = money("79228162514264337593543950335");
        let rows: Vec<ResidualRecord> = (0..11)
            .map(|i| ResidualRecord {
                id: ResidualId::generate(),
                earner: uid("alice"),
                source: uid("buyer"),
                amount: huge,
                upline_position: 1,
                created_at: Timestamp::from_millis(i),
            })
            .collect();
        store.put_residuals(&rows).unwrap();
        assert!(matches!(
            service.fetch_residuals(&uid("alice")).await,
            Err(EarningsError::Commission(CommissionError::Overflow))
        ));
    }

    #[tokio::test]
    async fn referrals_and_tree() {
        let (_store, clock, service) = service();
        service.register_referral(&uid("b"), &uid("a")).await.unwrap();
        clock.advance(10);
        service.register_referral(&uid("c"), &uid("a")).await.unwrap();
        clock.advance(10);
        service.register_referral(&uid("d"), &uid("b")).await.unwrap();

        let direct = service.direct_referrals(&uid("a")).await.unwrap();
        let names: Vec<&str> = direct.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(direct[1].enrolled_at, Timestamp::from_millis(1_000));

        let tree = service.fetch_downline(&uid("a"), DEFAULT_TREE_DEPTH).await.unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree[2].user_id, uid("d"));
        assert_eq!(tree[2].level_depth, 2);
        assert_eq!(tree[2].referral_path, vec![uid("b"), uid("d")]);
        assert_eq!(service.fetch_downline(&uid("a"), 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn commissions_are_newest_first_with_limit() {
        let (_store, clock, service) = service();
        service.register_referral(&uid("c"), &uid("b")).await.unwrap();
        service.register_referral(&uid("b"), &uid("a")).await.unwrap();
        service.record_sale(&uid("b"), money("100.00")).await.unwrap();
        clock.advance(10);
        service.record_sale(&uid("c"), money("50.00")).await.unwrap();

        let all = service.fetch_commissions(&uid("a"), None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, uid("c"));
        assert_eq!(all[0].tier, 2);
        assert_eq!(all[0].amount, money("1.00"));
        assert_eq!(all[1].tier, 1);
        assert_eq!(all[1].amount, money("10.00"));

        let latest = service.fetch_commissions(&uid("a"), Some(1)).await.unwrap();
        assert_eq!(latest, all[..1].to_vec());
    }

    #[tokio::test]
    async fn rank_progress_uses_stored_activity() {
        let (_store, _clock, service) = service();
        for buyer in ["b", "c"] {
            service.register_referral(&uid(buyer), &uid("a")).await.unwrap();
            service.record_sale(&uid(buyer), money("300.00")).await.unwrap();
        }
        let requirements = vec![
            RankRequirement {
                rank: Rank::Unranked,
                min_personal_volume_cents: 0,
                min_team_volume_cents: 0,
                min_direct_referrals: 0,
                min_active_downline: 0,
                monthly_bonus_cents: 0,
            },
            RankRequirement {
                rank: Rank::Bronze,
                min_personal_volume_cents: 10_000,
                min_team_volume_cents: 50_000,
                min_direct_referrals: 3,
                min_active_downline: 2,
                monthly_bonus_cents: 2_500,
            },
        ];

        let stats = service
            .member_stats(&uid("a"), Rank::Unranked, money("20.00"))
            .await
            .unwrap();
        assert_eq!(stats.team_volume_cents, 60_000);
        assert_eq!(stats.direct_referrals, 2);
        assert_eq!(stats.active_downline, 2);

        let progress = service
            .rank_progress(&uid("a"), Rank::Unranked, money("20.00"), &requirements)
            .await
            .unwrap();
        assert_eq!(progress.next_rank, Some(Rank::Bronze));
        assert!(!progress.requirements_met.personal_volume);
        assert!(progress.requirements_met.team_volume);
        assert!(!progress.requirements_met.direct_referrals);
        assert_eq!(progress.progress_percentage, 50);

        assert!(matches!(
            service
                .rank_progress(&uid("a"), Rank::Gold, Money::ZERO, &requirements)
                .await,
            Err(EarningsError::Commission(CommissionError::UnknownRank(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_payout_is_not_found() {
        let (_store, _clock, service) = service();
        let err = service
            .settle_payout(&PayoutId::generate(), PayoutStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, EarningsError::Persistence(StoreError::NotFound(_))));
    }
}
