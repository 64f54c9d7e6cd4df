//! Ledger behaviour against a real Postgres database (needs `DATABASE_URL`)

use chrono::{Duration, Utc};
use lending_ledger::{
    error::{AppError, ConflictKind},
    models::{
        item::{CreateItem, UpdateItem},
        pagination::{Page, PageRequest},
        user::Caller,
    },
    repository::{dashboard::day_start, loans::LoanLedger, Repository},
    services::Services,
};
use sqlx::PgPool;

use crate::common::state;

fn new_item(code: &str, total_copies: i32) -> CreateItem {
    CreateItem {
        title: format!("Title {code}"),
        author: "Ursula K. Le Guin".to_string(),
        category: "novel".to_string(),
        external_code: code.to_string(),
        total_copies,
    }
}

fn services(pool: PgPool) -> Services {
    state(pool).services.as_ref().clone()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_checkout_and_return_round_trip(pool: PgPool) {
    let services = services(pool);
    let item = services.catalog.create_item(new_item("RT-1", 2)).await.unwrap();
    let borrower = Caller::borrower(10);

    let loan = services.loans.checkout(&borrower, item.id).await.unwrap();
    assert_eq!(loan.due_at - loan.checked_out_at, Duration::days(14));
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 1);
    assert!(services.catalog.has_open_loan(item.id, 10).await.unwrap());

    let returned = services.loans.return_loan(loan.id).await.unwrap();
    assert!(returned.returned_at.is_some());
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 2);
    assert!(!services.catalog.has_open_loan(item.id, 10).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_checkouts_of_last_copy(pool: PgPool) {
    let services = services(pool);
    let item = services.catalog.create_item(new_item("LAST-1", 1)).await.unwrap();

    let (first, second) = (Caller::borrower(1), Caller::borrower(2));
    let (a, b) = tokio::join!(
        services.loans.checkout(&first, item.id),
        services.loans.checkout(&second, item.id),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(
        failure,
        Err(AppError::Conflict(ConflictKind::ItemNotAvailable))
    ));
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_capacity_is_never_exceeded(pool: PgPool) {
    let services = services(pool);
    let item = services.catalog.create_item(new_item("CAP-5", 5)).await.unwrap();

    let mut loans = Vec::new();
    for borrower in 1..=5 {
        loans.push(services.loans.checkout(&Caller::borrower(borrower), item.id).await.unwrap());
    }
    assert!(!services.catalog.is_available(item.id).await.unwrap());

    let err = services.loans.checkout(&Caller::borrower(6), item.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::ItemNotAvailable)));

    for loan in loans.iter().take(3) {
        services.loans.return_loan(loan.id).await.unwrap();
    }
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 3);

    let mut more = Vec::new();
    for borrower in 6..=9 {
        more.push(services.loans.checkout(&Caller::borrower(borrower), item.id).await);
    }
    assert_eq!(more.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_many_concurrent_checkouts_fill_capacity_exactly(pool: PgPool) {
    let services = services(pool);
    let item = services.catalog.create_item(new_item("RACE-3", 3)).await.unwrap();

    let handles: Vec<_> = (1..=20)
        .map(|borrower| {
            let loans = services.loans.clone();
            let item_id = item.id;
            tokio::spawn(async move { loans.checkout(&Caller::borrower(borrower), item_id).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::Conflict(ConflictKind::ItemNotAvailable))))
            .count(),
        17
    );
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_duplicate_checkout_is_rejected(pool: PgPool) {
    let services = services(pool);
    let item = services.catalog.create_item(new_item("DUP-1", 3)).await.unwrap();
    let borrower = Caller::borrower(4);

    services.loans.checkout(&borrower, item.id).await.unwrap();
    let err = services.loans.checkout(&borrower, item.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::DuplicateLoan)));
    assert_eq!(services.catalog.available_copies(item.id).await.unwrap(), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_returns_close_loan_once(pool: PgPool) {
    let repository = Repository::new(pool.clone(), &Default::default());
    let services = services(pool);
    let item = services.catalog.create_item(new_item("RET-1", 1)).await.unwrap();
    let loan = services.loans.checkout(&Caller::borrower(1), item.id).await.unwrap();

    let (a, b) = tokio::join!(services.loans.return_loan(loan.id), services.loans.return_loan(loan.id));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::Conflict(ConflictKind::AlreadyReturned)))));
    let first_return = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .and_then(|loan| loan.returned_at)
        .unwrap();

    let err = services.loans.return_loan(loan.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::AlreadyReturned)));

    // Rejected returns leave the recorded return time alone.
    let stored = repository.loans.get_by_id(loan.id).await.unwrap();
    assert_eq!(stored.returned_at, Some(first_return));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_unknown_ids_are_not_found(pool: PgPool) {
    let services = services(pool);

    let err = services.loans.checkout(&Caller::borrower(1), 9999).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = services.loans.return_loan(9999).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_item_with_open_loans_cannot_be_deleted_or_shrunk(pool: PgPool) {
    let services = services(pool);
    let item = services.catalog.create_item(new_item("DEL-1", 2)).await.unwrap();
    services.loans.checkout(&Caller::borrower(1), item.id).await.unwrap();
    services.loans.checkout(&Caller::borrower(2), item.id).await.unwrap();

    let err = services.catalog.delete_item(item.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::ItemHasActiveLoans)));

    let shrink = UpdateItem {
        total_copies: Some(1),
        ..Default::default()
    };
    let err = services
        .catalog
        .update_item(&Caller::operator(1), item.id, shrink)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::CopiesBelowOpenLoans)));

    let err = services.catalog.create_item(new_item("DEL-1", 1)).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::DuplicateExternalCode)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_overdue_ranking_orders_by_count(pool: PgPool) {
    let repository = Repository::new(pool.clone(), &Default::default());
    let services = services(pool);

    let mut items = Vec::new();
    for n in 0..3 {
        items.push(services.catalog.create_item(new_item(&format!("RANK-{n}"), 3)).await.unwrap());
    }

    // Borrower 3 holds three overdue loans, borrower 2 two, borrower 1 one.
    let long_ago = Utc::now() - Duration::days(30);
    for (borrower, count) in [(1, 1), (2, 2), (3, 3)] {
        for item in items.iter().take(count) {
            repository.loans.checkout(item.id, borrower, long_ago).await.unwrap();
        }
    }
    // A current loan does not count as overdue.
    repository.loans.checkout(items[2].id, 4, Utc::now()).await.unwrap();

    let snapshot = repository
        .dashboard
        .operator_snapshot(Utc::now(), Page { page: 1, per_page: 10 })
        .await
        .unwrap();

    let ranking: Vec<(i32, i64)> = snapshot
        .overdue_borrowers
        .iter()
        .map(|b| (b.borrower_id, b.overdue_count))
        .collect();
    assert_eq!(ranking, vec![(3, 3), (2, 2), (1, 1)]);
    assert_eq!(snapshot.overdue_borrowers_total, 3);
    assert_eq!(snapshot.summary.total_items, 3);
    assert_eq!(snapshot.summary.total_open_loans, 7);
    assert_eq!(snapshot.summary.overdue_loans, 6);

    let dashboard = services
        .dashboard
        .borrower_dashboard(3, Default::default())
        .await
        .unwrap();
    assert_eq!(dashboard.summary.total_borrowed, 3);
    assert_eq!(dashboard.summary.total_overdue, 3);
    // Sixteen days and a little past due rounds up to seventeen.
    assert!(dashboard.overdue.iter().all(|loan| loan.days_overdue == 17));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_overdue_ranking_ties_break_on_borrower_id_across_pages(pool: PgPool) {
    let repository = Repository::new(pool.clone(), &Default::default());
    let services = services(pool);

    let first = services.catalog.create_item(new_item("TIE-1", 4)).await.unwrap();
    let second = services.catalog.create_item(new_item("TIE-2", 4)).await.unwrap();

    let long_ago = Utc::now() - Duration::days(30);
    for borrower in [9, 5, 7] {
        repository.loans.checkout(first.id, borrower, long_ago).await.unwrap();
        repository.loans.checkout(second.id, borrower, long_ago).await.unwrap();
    }
    repository.loans.checkout(first.id, 1, long_ago).await.unwrap();

    let now = Utc::now();
    let mut ranking = Vec::new();
    for page in 1..=2 {
        let snapshot = repository
            .dashboard
            .operator_snapshot(now, Page { page, per_page: 2 })
            .await
            .unwrap();
        assert_eq!(snapshot.overdue_borrowers_total, 4);
        assert_eq!(snapshot.overdue_borrowers.len(), 2);
        ranking.extend(snapshot.overdue_borrowers.iter().map(|b| (b.borrower_id, b.overdue_count)));
    }
    assert_eq!(ranking, vec![(5, 2), (7, 2), (9, 2), (1, 1)]);

    // The overdue count covers every overdue loan, not just the borrowed page.
    let dashboard = services
        .dashboard
        .borrower_dashboard(
            5,
            PageRequest {
                page: Some(1),
                per_page: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(dashboard.borrowed.len(), 1);
    assert_eq!(dashboard.summary.total_borrowed, 2);
    assert_eq!(dashboard.summary.total_overdue, 2);
    assert_eq!(dashboard.overdue.len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_due_today_counts_open_loans_due_within_the_utc_day(pool: PgPool) {
    let repository = Repository::new(pool.clone(), &Default::default());
    let services = services(pool);
    let item = services.catalog.create_item(new_item("TODAY-1", 4)).await.unwrap();

    let noon = day_start(Utc::now()) + Duration::hours(12);

    // Due at 15:00 today.
    repository
        .loans
        .checkout(item.id, 1, noon - Duration::days(14) + Duration::hours(3))
        .await
        .unwrap();
    // Due yesterday at noon: overdue, not due today.
    repository.loans.checkout(item.id, 2, noon - Duration::days(15)).await.unwrap();
    // Due tomorrow at noon.
    repository.loans.checkout(item.id, 3, noon - Duration::days(13)).await.unwrap();
    // Due today but already returned.
    let returned = repository
        .loans
        .checkout(item.id, 4, noon - Duration::days(14) + Duration::hours(1))
        .await
        .unwrap();
    repository.loans.mark_returned(returned.id, noon).await.unwrap();

    let snapshot = repository
        .dashboard
        .operator_snapshot(noon, Page { page: 1, per_page: 10 })
        .await
        .unwrap();
    assert_eq!(snapshot.summary.due_today, 1);
    assert_eq!(snapshot.summary.overdue_loans, 1);
    assert_eq!(snapshot.summary.total_open_loans, 3);
}
