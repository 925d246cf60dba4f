mod common;

use chrono::{Duration, Utc};
use common::*;
use gasbank::{
    EnsureAccountOptions, LedgerError, Store, TransactionStatus, TransactionType, WithdrawOptions,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Ensure is idempotent per owner and refreshes settings in place
#[tokio::test]
async fn test_ensure_account_is_idempotent() {
    let t = TestLedger::new();
    let owner = TestData::owner();
    let wallet = TestData::wallet();

    let first = t
        .ledger
        .ensure_account(&owner, &wallet)
        .await
        .expect("Failed to create account");
    assert_eq!(first.wallet_address, wallet.to_lowercase());

    let options = EnsureAccountOptions {
        wallet_address: wallet.clone(),
        daily_limit: Some(dec!(50)),
        min_balance: Some(dec!(-3)),
        ..EnsureAccountOptions::default()
    };
    let second = t
        .ledger
        .ensure_account_with_options(&owner, options)
        .await
        .expect("Failed to refresh account");

    assert_eq!(second.id, first.id);
    assert_eq!(second.daily_limit, dec!(50));
    assert_eq!(second.min_balance, Decimal::ZERO);
    assert_eq!(t.ledger.list_accounts(&owner).await.unwrap().len(), 1);
}

/// A wallet belongs to one owner only, regardless of case
#[tokio::test]
async fn test_wallet_in_use_by_another_owner() {
    let t = TestLedger::new();
    let wallet = TestData::wallet();
    t.ledger
        .ensure_account(&TestData::owner(), &wallet)
        .await
        .expect("Failed to create account");

    let err = t
        .ledger
        .ensure_account(&TestData::owner(), &wallet.to_uppercase())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletInUse), "got {err:?}");
}

#[tokio::test]
async fn test_ensure_requires_owner() {
    let t = TestLedger::new();
    let err = t.ledger.ensure_account("  ", "w").await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

/// Deposits credit both balance and available
#[tokio::test]
async fn test_deposit_credits_balance_and_available() {
    let t = TestLedger::new();
    let account = t.account().await;

    let tx = t.deposit(&account, dec!(10)).await;
    assert_eq!(tx.tx_type, TransactionType::Deposit);
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert!(tx.completed_at.is_some());

    let account = t.reload(&account).await;
    assert_balances(&account, dec!(10), dec!(10), dec!(0), dec!(0));

    for amount in [Decimal::ZERO, dec!(-1)] {
        let err = t
            .ledger
            .deposit(account.id, amount, "", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount));
    }
}

/// Withdraw reserves funds, settling moves them off the books
#[tokio::test]
async fn test_withdraw_then_settle() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;

    let (after, tx) = t
        .ledger
        .withdraw(&account.account_id, account.id, dec!(4), "destination")
        .await
        .expect("Failed to withdraw");
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_balances(&after, dec!(10), dec!(6), dec!(4), dec!(0));
    assert_eq!(after.daily_withdrawal, dec!(4));

    let applied = t
        .ledger
        .complete_withdrawal(tx.id, true, "")
        .await
        .expect("Failed to complete withdrawal");
    assert_eq!(applied.transaction.status, TransactionStatus::Completed);
    assert!(applied.transaction.completed_at.is_some());
    assert_balances(&t.reload(&account).await, dec!(6), dec!(6), dec!(0), dec!(0));
}

/// A failed settlement hands the funds back and zeroes the net amount
#[tokio::test]
async fn test_failed_settlement_releases_funds() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;
    let tx = t.withdraw(&account, dec!(4)).await;

    let applied = t
        .ledger
        .complete_withdrawal(tx.id, false, "node rejected transfer")
        .await
        .expect("Failed to fail withdrawal");
    assert_eq!(applied.transaction.status, TransactionStatus::Failed);
    assert_eq!(applied.transaction.net_amount, Decimal::ZERO);
    assert_eq!(applied.transaction.error.as_deref(), Some("node rejected transfer"));
    assert_balances(&t.reload(&account).await, dec!(10), dec!(10), dec!(0), dec!(0));

    let err = t.ledger.complete_withdrawal(tx.id, true, "").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }), "got {err:?}");
}

/// Insufficient funds is reported before the minimum balance check
#[tokio::test]
async fn test_withdraw_policy_order() {
    let t = TestLedger::new();
    let account = t
        .account_with(EnsureAccountOptions {
            wallet_address: TestData::wallet(),
            min_balance: Some(dec!(3)),
            daily_limit: Some(dec!(5)),
            ..EnsureAccountOptions::default()
        })
        .await;
    t.deposit(&account, dec!(10)).await;

    let err = t
        .ledger
        .withdraw(&account.account_id, account.id, dec!(11), "d")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds), "got {err:?}");

    let err = t
        .ledger
        .withdraw(&account.account_id, account.id, dec!(8), "d")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MinBalance), "got {err:?}");

    t.withdraw(&account, dec!(3)).await;
    let err = t
        .ledger
        .withdraw(&account.account_id, account.id, dec!(3), "d")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DailyLimit), "got {err:?}");

    // Rejected attempts leave the account untouched.
    assert_balances(&t.reload(&account).await, dec!(10), dec!(7), dec!(3), dec!(0));
}

/// Daily usage from a previous UTC day does not count
#[tokio::test]
async fn test_daily_limit_resets_on_new_day() {
    let t = TestLedger::new();
    let account = t
        .account_with(EnsureAccountOptions {
            wallet_address: TestData::wallet(),
            daily_limit: Some(dec!(5)),
            ..EnsureAccountOptions::default()
        })
        .await;
    t.deposit(&account, dec!(20)).await;

    let mut stale = t.reload(&account).await;
    stale.daily_withdrawal = dec!(5);
    stale.last_withdrawal = Some(Utc::now() - Duration::days(1));
    t.store.update_gas_account(stale).await.unwrap();

    let (after, _) = t
        .ledger
        .withdraw(&account.account_id, account.id, dec!(5), "d")
        .await
        .expect("Failed to withdraw after day rollover");
    assert_eq!(after.daily_withdrawal, dec!(5));
}

#[tokio::test]
async fn test_withdraw_rejects_bad_input() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;

    let err = t
        .ledger
        .withdraw(&account.account_id, account.id, Decimal::ZERO, "d")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount));

    let err = t
        .ledger
        .withdraw_with_options(
            &account.account_id,
            account.id,
            WithdrawOptions {
                amount: dec!(1),
                cron_expression: Some("0 * * * *".to_string()),
                ..WithdrawOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CronUnsupported));
}

/// Another owner cannot see or touch an account's withdrawals
#[tokio::test]
async fn test_ownership_is_enforced() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;
    let stranger = TestData::owner();

    let err = t
        .ledger
        .withdraw(&stranger, account.id, dec!(1), "d")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)), "got {err:?}");

    let tx = t.withdraw(&account, dec!(2)).await;
    assert!(matches!(
        t.ledger.get_withdrawal(&stranger, tx.id).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        t.ledger.cancel_withdrawal(&stranger, tx.id, "").await,
        Err(LedgerError::NotFound(_))
    ));
    assert_eq!(
        t.transaction(tx.id).await.status,
        TransactionStatus::Pending,
        "foreign cancel must not change the withdrawal"
    );
}

/// Cancelling a pending withdrawal returns the reservation
#[tokio::test]
async fn test_cancel_withdrawal() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;
    let tx = t.withdraw(&account, dec!(4)).await;

    let applied = t
        .ledger
        .cancel_withdrawal(&account.account_id, tx.id, "changed my mind")
        .await
        .expect("Failed to cancel");
    assert_eq!(applied.transaction.status, TransactionStatus::Cancelled);
    assert_eq!(applied.transaction.error.as_deref(), Some("changed my mind"));
    assert_eq!(applied.transaction.net_amount, Decimal::ZERO);
    assert_balances(&t.reload(&account).await, dec!(10), dec!(10), dec!(0), dec!(0));

    let err = t
        .ledger
        .cancel_withdrawal(&account.account_id, tx.id, "")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
}

/// A failed transaction write undoes the balance change
#[tokio::test]
async fn test_deposit_rollback_on_transaction_failure() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(5)).await;

    t.store.fail_next_transaction_write();
    let err = t
        .ledger
        .deposit(account.id, dec!(7), "0xabc", "", "")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Store(_)), "got {err:?}");
    assert_balances(&t.reload(&account).await, dec!(5), dec!(5), dec!(0), dec!(0));
    assert_eq!(t.ledger.list_transactions(account.id, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_withdraw_rollback_on_transaction_failure() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(5)).await;

    t.store.fail_next_transaction_write();
    let err = t
        .ledger
        .withdraw(&account.account_id, account.id, dec!(2), "d")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Store(_)), "got {err:?}");

    let account = t.reload(&account).await;
    assert_balances(&account, dec!(5), dec!(5), dec!(0), dec!(0));
    assert_eq!(account.daily_withdrawal, Decimal::ZERO);
}

/// Listing is newest first and can be filtered by type and status
#[tokio::test]
async fn test_list_transactions_filters() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;
    let first = t.withdraw(&account, dec!(1)).await;
    let second = t.withdraw(&account, dec!(2)).await;
    t.ledger.complete_withdrawal(first.id, true, "").await.unwrap();

    let all = t.ledger.list_transactions(account.id, 0).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let pending = t
        .ledger
        .list_transactions_filtered(
            account.id,
            Some(TransactionType::Withdrawal),
            Some(TransactionStatus::Pending),
            10,
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);

    let limited = t.ledger.list_transactions(account.id, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

/// Summary aggregates across the owner's accounts
#[tokio::test]
async fn test_summary() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;
    let done = t.withdraw(&account, dec!(1)).await;
    t.withdraw(&account, dec!(2)).await;
    t.ledger.complete_withdrawal(done.id, true, "").await.unwrap();

    let summary = t
        .ledger
        .summary(&account.account_id)
        .await
        .expect("Failed to build summary");
    assert_eq!(summary.accounts.len(), 1);
    assert_eq!(summary.total_balance, dec!(9));
    assert_eq!(summary.total_available, dec!(7));
    assert_eq!(summary.pending_withdrawals, 1);
    assert_eq!(summary.pending_amount, dec!(2));
    assert_eq!(
        summary.last_deposit.as_ref().map(|d| d.amount),
        Some(dec!(10))
    );
    assert!(summary.last_withdrawal.is_some());
}

/// An explicit zero overwrites a setting, an omitted one leaves it alone
#[tokio::test]
async fn test_ensure_account_zero_overwrites_settings() {
    let t = TestLedger::new();
    let owner = TestData::owner();
    let wallet = TestData::wallet();

    let configured = t
        .ledger
        .ensure_account_with_options(
            &owner,
            EnsureAccountOptions {
                wallet_address: wallet.clone(),
                min_balance: Some(dec!(1)),
                daily_limit: Some(dec!(5)),
                required_approvals: Some(2),
                ..EnsureAccountOptions::default()
            },
        )
        .await
        .expect("Failed to create account");
    assert_eq!(configured.required_approvals, 2);

    let refreshed = t
        .ledger
        .ensure_account_with_options(
            &owner,
            EnsureAccountOptions {
                wallet_address: wallet.clone(),
                daily_limit: Some(Decimal::ZERO),
                required_approvals: Some(0),
                ..EnsureAccountOptions::default()
            },
        )
        .await
        .expect("Failed to refresh account");

    assert_eq!(refreshed.id, configured.id);
    assert_eq!(refreshed.daily_limit, Decimal::ZERO);
    assert_eq!(refreshed.required_approvals, 0);
    assert_eq!(refreshed.min_balance, dec!(1));

    let untouched = t
        .ledger
        .ensure_account(&owner, &wallet)
        .await
        .expect("Failed to ensure account");
    assert_eq!(untouched.min_balance, dec!(1));
    assert_eq!(untouched.daily_limit, Decimal::ZERO);
}

/// Amounts finer than the smallest chain unit are refused, not rounded
#[tokio::test]
async fn test_sub_unit_amounts_are_rejected() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;

    for amount in [dec!(0.000000001), dec!(1.123456789)] {
        let err = t
            .ledger
            .deposit(account.id, amount, &TestData::chain_tx(), "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount), "got {err:?}");

        let err = t
            .ledger
            .withdraw(&account.account_id, account.id, amount, "d")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount), "got {err:?}");
    }
    assert_balances(&t.reload(&account).await, dec!(10), dec!(10), dec!(0), dec!(0));
    assert_eq!(t.ledger.list_transactions(account.id, 0).await.unwrap().len(), 1);

    // trailing zeros past the eighth place are still whole smallest units
    let (_, tx) = t
        .ledger
        .deposit(account.id, dec!(0.0000000100), &TestData::chain_tx(), "", "")
        .await
        .expect("Failed to deposit one smallest unit");
    assert_eq!(tx.amount, dec!(0.00000001));
}

/// A schedule that cannot be saved cancels the withdrawal and restores funds
#[tokio::test]
async fn test_withdraw_rollback_on_schedule_failure() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;

    t.store.fail_next_schedule_write();
    let err = t
        .ledger
        .withdraw_with_options(
            &account.account_id,
            account.id,
            WithdrawOptions {
                amount: dec!(2),
                to_address: "d".to_string(),
                schedule_at: Some(Utc::now() + Duration::hours(1)),
                ..WithdrawOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Store(_)), "got {err:?}");
    assert_balances(&t.reload(&account).await, dec!(10), dec!(10), dec!(0), dec!(0));

    let txs = t
        .ledger
        .list_transactions_filtered(account.id, Some(TransactionType::Withdrawal), None, 0)
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TransactionStatus::Cancelled);
}

/// When the withdrawal cannot be cancelled either, its funds stay reserved
#[tokio::test]
async fn test_schedule_and_cancel_failure_keeps_reservation() {
    let t = TestLedger::new();
    let account = t.funded_account(dec!(10)).await;

    t.store.fail_next_schedule_write();
    t.store.fail_transaction_write_after(1);
    let err = t
        .ledger
        .withdraw_with_options(
            &account.account_id,
            account.id,
            WithdrawOptions {
                amount: dec!(2),
                to_address: "d".to_string(),
                schedule_at: Some(Utc::now() + Duration::hours(1)),
                ..WithdrawOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invariant(_)), "got {err:?}");
    assert_balances(&t.reload(&account).await, dec!(10), dec!(8), dec!(2), dec!(0));

    let txs = t
        .ledger
        .list_transactions_filtered(account.id, Some(TransactionType::Withdrawal), None, 0)
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TransactionStatus::Scheduled);

    t.ledger
        .cancel_withdrawal(&account.account_id, txs[0].id, "")
        .await
        .expect("Failed to cancel stranded withdrawal");
    assert_balances(&t.reload(&account).await, dec!(10), dec!(10), dec!(0), dec!(0));
}
