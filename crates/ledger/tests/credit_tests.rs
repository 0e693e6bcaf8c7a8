//! Tests for the transfer and debt engine.

use std::sync::Arc;

use chas_core::CoreError;
use chas_ledger::{jobs, Balance, CreditEngine, EntryKind, LedgerBook, LedgerEntry};
use chas_store::{MemTable, Query, TableRef};
use uuid::Uuid;

struct Harness {
    credit: CreditEngine,
    book: LedgerBook,
    balances: TableRef<Balance>,
    entries: TableRef<LedgerEntry>,
}

fn harness() -> Harness {
    let balances: TableRef<Balance> = Arc::new(MemTable::new());
    let entries: TableRef<LedgerEntry> = Arc::new(MemTable::new());
    Harness {
        credit: CreditEngine::new(Arc::clone(&balances)),
        book: LedgerBook::new(Arc::clone(&entries), Arc::clone(&balances)),
        balances,
        entries,
    }
}

/// Set the debt field directly; the reset tests care about the arithmetic,
/// not how the debt was accrued.
async fn set_debt(h: &Harness, user: Uuid, community: Uuid, debt: i64) {
    h.balances
        .update(
            Query::new().filter(move |balance: &Balance| {
                balance.user_id == user && balance.community_id == community
            }),
            chas_store::patch(move |balance: &mut Balance| balance.debt = debt),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn ensure_balance_is_idempotent() {
    let h = harness();
    let user = Uuid::new_v4();
    let community = Uuid::new_v4();

    let first = h.credit.ensure_balance(user, community, 100).await.unwrap();
    assert_eq!(first.remaining, 100);
    assert_eq!(first.debt, 0);

    h.credit.spend(user, community, 30).await.unwrap();
    let second = h.credit.ensure_balance(user, community, 100).await.unwrap();
    assert_eq!(second.remaining, 70);
}

#[tokio::test]
async fn missing_balance_is_not_found() {
    let h = harness();
    let err = h
        .credit
        .balance(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn spend_never_drives_remaining_negative() {
    let h = harness();
    let user = Uuid::new_v4();
    let community = Uuid::new_v4();
    h.credit.ensure_balance(user, community, 100).await.unwrap();

    let err = h.credit.spend(user, community, 120).await.unwrap_err();
    match err {
        CoreError::InsufficientFunds {
            required,
            available,
        } => {
            assert_eq!(required, 120);
            assert_eq!(available, 100);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    // The failed spend left the balance untouched.
    let balance = h.credit.balance(user, community).await.unwrap();
    assert_eq!(balance.remaining, 100);
    assert_eq!(balance.spent_today, 0);
}

#[tokio::test]
async fn concurrent_spends_respect_the_balance() {
    let h = harness();
    let user = Uuid::new_v4();
    let community = Uuid::new_v4();
    h.credit.ensure_balance(user, community, 100).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let credit = h.credit.clone();
        tasks.push(tokio::spawn(async move {
            credit.spend(user, community, 60).await
        }));
    }
    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    let balance = h.credit.balance(user, community).await.unwrap();
    assert_eq!(balance.remaining, 40);
    assert_eq!(balance.spent_today, 60);
}

#[tokio::test]
async fn transfer_moves_funds_and_accrues_debt() {
    let h = harness();
    let community = Uuid::new_v4();
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    h.credit.ensure_balance(lender, community, 100).await.unwrap();
    h.credit.ensure_balance(borrower, community, 100).await.unwrap();
    h.credit.spend(borrower, community, 80).await.unwrap();

    let (lender_after, borrower_after) = h
        .credit
        .transfer(lender, borrower, community, 25)
        .await
        .unwrap();

    assert_eq!(lender_after.remaining, 75);
    assert_eq!(lender_after.spent_today, 25);
    assert_eq!(lender_after.debt, 0);
    assert_eq!(borrower_after.remaining, 45);
    assert_eq!(borrower_after.debt, 25);
}

#[tokio::test]
async fn transfer_fails_on_short_lender_without_touching_borrower() {
    let h = harness();
    let community = Uuid::new_v4();
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    h.credit.ensure_balance(lender, community, 10).await.unwrap();
    h.credit.ensure_balance(borrower, community, 100).await.unwrap();

    let err = h
        .credit
        .transfer(lender, borrower, community, 25)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientFunds { .. }));

    let borrower_balance = h.credit.balance(borrower, community).await.unwrap();
    assert_eq!(borrower_balance.remaining, 100);
    assert_eq!(borrower_balance.debt, 0);
}

#[tokio::test]
async fn refund_restores_remaining_and_clamps_spent() {
    let h = harness();
    let user = Uuid::new_v4();
    let community = Uuid::new_v4();
    h.credit.ensure_balance(user, community, 100).await.unwrap();
    h.credit.spend(user, community, 60).await.unwrap();

    let refunded = h.credit.refund(user, community, 60).await.unwrap();
    assert_eq!(refunded.remaining, 100);
    assert_eq!(refunded.spent_today, 0);

    // Refunding more than was spent today clamps spent_today at zero.
    let over = h.credit.refund(user, community, 50).await.unwrap();
    assert_eq!(over.remaining, 150);
    assert_eq!(over.spent_today, 0);
}

#[tokio::test]
async fn reset_repays_debt_from_new_allocation() {
    let h = harness();
    let user = Uuid::new_v4();
    let community = Uuid::new_v4();
    h.credit.ensure_balance(user, community, 100).await.unwrap();

    // debt 30, budget 100 -> debt 0, remaining 70, spent 30
    set_debt(&h, user, community, 30).await;
    let balance = h.credit.balance(user, community).await.unwrap();
    let updated = h.credit.reset_with_debt(&balance).await.unwrap();
    assert_eq!(updated.debt, 0);
    assert_eq!(updated.remaining, 70);
    assert_eq!(updated.spent_today, 30);

    // debt 150, budget 100 -> debt 50, remaining 0, spent 100
    set_debt(&h, user, community, 150).await;
    let balance = h.credit.balance(user, community).await.unwrap();
    let updated = h.credit.reset_with_debt(&balance).await.unwrap();
    assert_eq!(updated.debt, 50);
    assert_eq!(updated.remaining, 0);
    assert_eq!(updated.spent_today, 100);

    // no debt -> full budget restored
    set_debt(&h, user, community, 0).await;
    let balance = h.credit.balance(user, community).await.unwrap();
    let updated = h.credit.reset_with_debt(&balance).await.unwrap();
    assert_eq!(updated.remaining, 100);
    assert_eq!(updated.spent_today, 0);
}

#[tokio::test]
async fn daily_reset_records_one_entry_per_balance() {
    let h = harness();
    let community = Uuid::new_v4();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    h.credit.ensure_balance(a, community, 100).await.unwrap();
    h.credit.ensure_balance(b, community, 100).await.unwrap();
    set_debt(&h, b, community, 40).await;

    let count = jobs::daily_cc_reset(&h.credit, &h.book).await.unwrap();
    assert_eq!(count, 2);

    let resets = h
        .entries
        .select_many(Query::new().filter(|entry: &LedgerEntry| entry.kind == EntryKind::DailyReset))
        .await
        .unwrap();
    assert_eq!(resets.len(), 2);
    let for_b = resets.iter().find(|entry| entry.user_id == b).unwrap();
    // Post-reset remaining after repaying 40 of debt.
    assert_eq!(for_b.amount, 60);
}

#[tokio::test]
async fn summary_counts_negative_declarations_only() {
    let h = harness();
    let user = Uuid::new_v4();
    let community = Uuid::new_v4();
    h.credit.ensure_balance(user, community, 100).await.unwrap();
    h.credit.spend(user, community, 30).await.unwrap();
    h.book
        .record(user, community, EntryKind::Declaration, -30, "Declared", None)
        .await
        .unwrap();
    h.book
        .record(user, community, EntryKind::TipToTip, -50, "Proposed", None)
        .await
        .unwrap();

    let summary = h.book.summary(user, community).await.unwrap();
    assert_eq!(summary.total_spent_all_time, 30);
    assert_eq!(summary.remaining_today, 70);
    assert_eq!(summary.spent_today, 30);

    let (rows, total) = h.book.entries(user, community, 1, 0).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(total, 2);
}
