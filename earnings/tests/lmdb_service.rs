//! End-to-end service runs against the LMDB backend.

use std::sync::Arc;

use yalls_earnings::{EarningsConfig, EarningsService, PayoutRequest, Stores};
use yalls_store_lmdb::LmdbEnvironment;
use yalls_types::{IdempotencyKey, Money, PayoutStatus, SystemClock, UserId};

fn uid(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn open_service(path: &std::path::Path) -> EarningsService {
    let env = LmdbEnvironment::open(path, 10 * 1024 * 1024).unwrap();
    let stores = Stores {
        payouts: Arc::new(env.payout_store()),
        residuals: Arc::new(env.residual_store()),
        uplines: Arc::new(env.upline_directory()),
    };
    EarningsService::new(stores, Arc::new(SystemClock), &EarningsConfig::default())
}

#[tokio::test]
async fn earnings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let payout_id = {
        let service = open_service(dir.path());
        service.register_referral(&uid("buyer"), &uid("seller")).await.unwrap();
        service.register_referral(&uid("seller"), &uid("mentor")).await.unwrap();
        service.record_sale(&uid("buyer"), money("200.00")).await.unwrap();

        service
            .request_payout(
                PayoutRequest::new(uid("seller"), money("15.00"))
                    .with_idempotency_key(IdempotencyKey::new("cashout-1").unwrap()),
            )
            .await
            .unwrap()
            .id
    };

    let service = open_service(dir.path());
    assert_eq!(service.fetch_residuals(&uid("seller")).await.unwrap(), money("20.00"));
    assert_eq!(service.fetch_residuals(&uid("mentor")).await.unwrap(), money("4.00"));
    assert_eq!(service.available_balance(&uid("seller")).await.unwrap(), money("5.00"));

    let again = service
        .request_payout(
            PayoutRequest::new(uid("seller"), money("15.00"))
                .with_idempotency_key(IdempotencyKey::new("cashout-1").unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(again.id, payout_id);
    assert_eq!(again.status, PayoutStatus::Pending);
    assert_eq!(service.fetch_payouts(&uid("seller")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn two_sales_accumulate_per_tier() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(dir.path());
    service.register_referral(&uid("d"), &uid("c")).await.unwrap();
    service.register_referral(&uid("c"), &uid("b")).await.unwrap();
    service.register_referral(&uid("b"), &uid("a")).await.unwrap();

    service.record_sale(&uid("d"), money("100")).await.unwrap();
    service.record_sale(&uid("c"), money("100")).await.unwrap();

    // a is tier 3 for d's sale and tier 2 for c's: 0.60 + 2.00.
    assert_eq!(service.fetch_residuals(&uid("a")).await.unwrap(), money("2.60"));
    assert_eq!(service.fetch_residuals(&uid("b")).await.unwrap(), money("12.00"));
}

#[tokio::test]
async fn downline_and_commissions_read_back_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = open_service(dir.path());
        service.register_referral(&uid("b"), &uid("a")).await.unwrap();
        service.register_referral(&uid("c"), &uid("b")).await.unwrap();
        service.register_referral(&uid("d"), &uid("c")).await.unwrap();
        service.record_sale(&uid("d"), money("100")).await.unwrap();
    }

    let service = open_service(dir.path());
    let tree = service.fetch_downline(&uid("a"), 5).await.unwrap();
    let depths: Vec<u32> = tree.iter().map(|m| m.level_depth).collect();
    assert_eq!(depths, vec![1, 2, 3]);
    assert_eq!(tree[2].referral_path, vec![uid("b"), uid("c"), uid("d")]);
    assert_eq!(service.direct_referrals(&uid("b")).await.unwrap()[0].user, uid("c"));

    let commissions = service.fetch_commissions(&uid("a"), Some(5)).await.unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].tier, 3);
    assert_eq!(commissions[0].amount, money("0.60"));
}
