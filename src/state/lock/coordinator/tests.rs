use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use proptest::collection::vec;
use proptest::prelude::*;
use test_strategy::proptest;
use tracing_test::traced_test;

use super::*;
use crate::state::lock::status::outcome;
use crate::state::lock::status::StatusCode;
use crate::tests::paused_runtime;
use crate::tests::shared::MockControls;
use crate::tests::shared::MockKeyVault;
use crate::tests::shared::MOCK_BALANCE;

type Coordinator = WalletLockCoordinator<MockKeyVault>;

fn unencrypted() -> (Coordinator, Arc<MockControls>) {
    let (vault, controls) = MockKeyVault::unencrypted();
    (WalletLockCoordinator::new(vault), controls)
}

async fn locked_with(password: &str) -> (Coordinator, Arc<MockControls>) {
    let (vault, controls) = MockKeyVault::encrypted_with(password);
    let coordinator = WalletLockCoordinator::new(vault);
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    (coordinator, controls)
}

async fn sleep_secs(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn abc_scenario() {
    let (coordinator, _) = unencrypted();
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);

    let result = coordinator.set_password("abc", None).await;
    assert_eq!((true, StatusCode::Ok), outcome(&result));
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);

    let result = coordinator.unlock_wallet("abc", 2).await;
    assert_eq!((true, StatusCode::Ok), outcome(&result));
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);

    let result = coordinator.lock_wallet().await;
    assert_eq!((true, StatusCode::Ok), outcome(&result));
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);

    let result = coordinator.lock_wallet().await;
    assert_eq!((false, StatusCode::AlreadyLocked), outcome(&result));
    assert_eq!(0, coordinator.pending_relocks());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn manual_lock_prevents_auto_relock() {
    let (coordinator, controls) = locked_with("pw").await;

    coordinator.unlock_wallet("pw", 5).await.unwrap();
    assert_eq!(1, coordinator.pending_relocks());
    sleep_secs(2.0).await;

    coordinator.lock_wallet().await.unwrap();
    assert_eq!(1, controls.encrypts());
    assert_eq!(0, coordinator.pending_relocks());

    sleep_secs(10.0).await;
    assert_eq!(1, controls.encrypts(), "no encrypt after the manual lock");
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn second_unlock_resets_timer() {
    let (coordinator, controls) = locked_with("pw").await;

    coordinator.unlock_wallet("pw", 5).await.unwrap();
    sleep_secs(3.0).await;
    coordinator.unlock_wallet("pw", 5).await.unwrap();
    assert_eq!(1, coordinator.pending_relocks());

    // past the first deadline, before the second
    sleep_secs(3.0).await;
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);
    assert_eq!(0, controls.encrypts());

    sleep_secs(2.5).await;
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(1, controls.encrypts());
    assert_eq!(0, coordinator.pending_relocks());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn changed_password_replaces_old_one() {
    let (coordinator, _) = unencrypted();
    coordinator.set_password("p", None).await.unwrap();

    coordinator.set_password("p", Some("p2")).await.unwrap();
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);

    assert_eq!(
        Err(WalletLockError::IncorrectPassword),
        coordinator.remove_wallet_password("p").await
    );
    coordinator.remove_wallet_password("p2").await.unwrap();
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn auto_relock_round_trip() {
    let (coordinator, _) = unencrypted();
    coordinator.set_password("p", None).await.unwrap();
    coordinator.unlock_wallet("p", 5).await.unwrap();
    assert_eq!(Ok(MOCK_BALANCE), coordinator.get_available_balance().await);

    let status = coordinator.lock_status().await;
    assert_eq!(ModeKind::UnlockedTimed, status.mode);
    assert_eq!(Some(5), status.relock_in_secs);

    sleep_secs(5.5).await;
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(
        (false, StatusCode::WalletLocked),
        outcome(&coordinator.get_available_balance().await)
    );
    assert_eq!(None, coordinator.lock_status().await.relock_in_secs);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn unavailable_until_vault_loads() {
    let (vault, controls) = MockKeyVault::unloaded();
    let coordinator = WalletLockCoordinator::new(vault);

    assert_eq!(ModeKind::Unavailable, coordinator.mode_kind().await);
    assert_eq!(
        Err(WalletLockError::WalletNotAvailable),
        coordinator.get_available_balance().await
    );
    assert_eq!(
        Err(WalletLockError::WalletNotAvailable),
        coordinator.set_password("p", None).await
    );
    assert_eq!(
        Err(WalletLockError::WalletNotAvailable),
        coordinator.remove_wallet_password("p").await
    );
    assert_eq!(
        Err(WalletLockError::WalletNotAvailable),
        coordinator.unlock_wallet("p", 5).await
    );
    assert_eq!(
        Err(WalletLockError::AlreadyLocked),
        coordinator.lock_wallet().await
    );
    assert_eq!(0, controls.derive_calls.load(Ordering::SeqCst));

    controls.unavailable.store(false, Ordering::SeqCst);
    assert_eq!(Ok(ModeKind::Unencrypted), coordinator.load_vault().await);
    assert_eq!(Ok(MOCK_BALANCE), coordinator.get_available_balance().await);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn precondition_failures_leave_mode_unchanged() {
    let (coordinator, controls) = unencrypted();
    assert_eq!(
        Err(WalletLockError::WalletNotEncrypted),
        coordinator.set_password("p", Some("q")).await
    );
    assert_eq!(
        Err(WalletLockError::WalletNotEncrypted),
        coordinator.remove_wallet_password("p").await
    );
    assert_eq!(
        Err(WalletLockError::WalletNotEncrypted),
        coordinator.unlock_wallet("p", 5).await
    );
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);

    // an empty new password is the same as none
    coordinator.set_password("p", Some("")).await.unwrap();
    assert_eq!(
        Err(WalletLockError::WalletIsEncrypted),
        coordinator.set_password("p", None).await
    );

    coordinator.unlock_wallet("p", 60).await.unwrap();
    assert_eq!(
        Err(WalletLockError::WalletIsEncrypted),
        coordinator.set_password("p", None).await
    );
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);
    assert_eq!(1, controls.encrypts());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn missing_encrypter_is_reported() {
    let (coordinator, controls) = unencrypted();
    controls.no_encrypter.store(true, Ordering::SeqCst);

    assert_eq!(
        (false, StatusCode::EncrypterNotAvailable),
        outcome(&coordinator.set_password("p", None).await)
    );
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);
    assert_eq!(0, controls.encrypts());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn wrong_passwords_are_rejected() {
    let (coordinator, controls) = locked_with("right").await;

    assert_eq!(
        Err(WalletLockError::IncorrectPassword),
        coordinator.unlock_wallet("wrong", 5).await
    );
    assert_eq!(
        Err(WalletLockError::IncorrectPassword),
        coordinator.remove_wallet_password("wrong").await
    );
    assert_eq!(
        Err(WalletLockError::IncorrectOldPassword),
        coordinator.set_password("wrong", Some("new")).await
    );
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, coordinator.pending_relocks());
    assert_eq!(0, controls.decrypts());

    coordinator.unlock_wallet("right", 30).await.unwrap();
    assert_eq!(
        Err(WalletLockError::IncorrectPassword),
        coordinator.unlock_wallet("wrong", 5).await
    );
    assert_eq!(
        Err(WalletLockError::IncorrectOldPassword),
        coordinator.set_password("wrong", Some("new")).await
    );
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);
    assert_eq!(1, coordinator.pending_relocks());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn non_positive_timeout_is_invalid() {
    let (coordinator, controls) = locked_with("pw").await;
    for timeout in [0, -1, i64::MIN] {
        assert_eq!(
            (false, StatusCode::InvalidArgument),
            outcome(&coordinator.unlock_wallet("pw", timeout).await)
        );
    }
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, controls.derive_calls.load(Ordering::SeqCst));
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn remove_password_while_unlocked_cancels_relock() {
    let (coordinator, controls) = locked_with("pw").await;
    coordinator.unlock_wallet("pw", 5).await.unwrap();
    assert_eq!(1, controls.decrypts());

    coordinator.remove_wallet_password("pw").await.unwrap();
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);
    assert_eq!(1, controls.decrypts(), "already decrypted");
    assert_eq!(0, coordinator.pending_relocks());

    sleep_secs(10.0).await;
    assert_eq!(0, controls.encrypts());
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn change_password_while_unlocked_ends_unlock() {
    let (coordinator, controls) = locked_with("p").await;
    coordinator.unlock_wallet("p", 5).await.unwrap();

    coordinator.set_password("p", Some("p2")).await.unwrap();
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, coordinator.pending_relocks());
    assert_eq!(1, controls.encrypts());

    sleep_secs(10.0).await;
    assert_eq!(1, controls.encrypts());
    coordinator.unlock_wallet("p2", 5).await.unwrap();
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn failed_lock_keeps_unlock_and_its_relock() {
    let (coordinator, controls) = locked_with("pw").await;
    coordinator.unlock_wallet("pw", 5).await.unwrap();

    controls.fail_next_encrypts(1);
    assert_eq!(
        (false, StatusCode::Internal),
        outcome(&coordinator.lock_wallet().await)
    );
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);
    assert_eq!(1, coordinator.pending_relocks());

    sleep_secs(5.5).await;
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn failed_auto_relock_is_retried() {
    let (coordinator, controls) = locked_with("pw").await;
    coordinator.unlock_wallet("pw", 5).await.unwrap();
    controls.fail_next_encrypts(1);

    sleep_secs(5.5).await;
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);
    assert_eq!(1, coordinator.pending_relocks());
    assert!(logs_contain("automatic relock failed"));

    sleep_secs(RELOCK_RETRY_DELAY.as_secs_f64()).await;
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, coordinator.pending_relocks());
    assert_eq!(2, controls.encrypts());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn failed_password_change_rolls_back() {
    let (coordinator, controls) = locked_with("old").await;
    controls.fail_next_encrypts(1);

    assert_eq!(
        (false, StatusCode::Internal),
        outcome(&coordinator.set_password("old", Some("new")).await)
    );
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    coordinator.unlock_wallet("old", 5).await.unwrap();
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn failed_rollback_reports_unencrypted() {
    let (coordinator, controls) = locked_with("old").await;
    controls.fail_next_encrypts(2);

    assert_eq!(
        (false, StatusCode::Internal),
        outcome(&coordinator.set_password("old", Some("new")).await)
    );
    assert_eq!(ModeKind::Unencrypted, coordinator.mode_kind().await);
    assert!(logs_contain("wallet is unencrypted"));
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn abandoned_password_change_still_completes() {
    let (coordinator, controls) = locked_with("old").await;
    controls.slow_encrypts(Duration::from_millis(50));

    // the caller gives up after decrypt, while encrypt is still running
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        coordinator.set_password("old", Some("new")),
    )
    .await;
    assert!(abandoned.is_err());

    sleep_secs(0.1).await;
    assert_eq!(1, controls.decrypts());
    assert_eq!(1, controls.encrypts());
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);

    controls.slow_encrypts(Duration::ZERO);
    assert_eq!(
        Err(WalletLockError::IncorrectPassword),
        coordinator.unlock_wallet("old", 5).await
    );
    coordinator.unlock_wallet("new", 5).await.unwrap();
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn abandoned_lock_still_relocks() {
    let (coordinator, controls) = locked_with("pw").await;
    coordinator.unlock_wallet("pw", 600).await.unwrap();
    controls.slow_encrypts(Duration::from_millis(50));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), coordinator.lock_wallet()).await;
    assert!(abandoned.is_err());

    sleep_secs(0.1).await;
    assert_eq!(1, controls.encrypts());
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, coordinator.pending_relocks());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn oversized_timeout_is_rejected_before_decrypt() {
    let (coordinator, controls) = locked_with("pw").await;
    let just_over = MAX_UNLOCK_TIMEOUT.as_secs() as i64 + 1;
    for timeout in [i64::MAX, just_over] {
        assert_eq!(
            (false, StatusCode::InvalidArgument),
            outcome(&coordinator.unlock_wallet("pw", timeout).await)
        );
    }
    assert_eq!(0, controls.decrypts());
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, coordinator.pending_relocks());

    let longest = MAX_UNLOCK_TIMEOUT.as_secs() as i64;
    coordinator.unlock_wallet("pw", longest).await.unwrap();
    assert_eq!(ModeKind::UnlockedTimed, coordinator.mode_kind().await);
    let status = coordinator.lock_status().await;
    assert!(status.relock_in_secs.is_some_and(|secs| secs <= longest as u64));
    coordinator.lock_wallet().await.unwrap();
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn shutdown_relocks_timed_unlock() {
    let (coordinator, controls) = locked_with("pw").await;
    coordinator.shutdown().await.unwrap();
    assert_eq!(0, controls.encrypts());

    coordinator.unlock_wallet("pw", 600).await.unwrap();
    coordinator.shutdown().await.unwrap();
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(1, controls.encrypts());
    assert_eq!(0, coordinator.pending_relocks());
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn concurrent_unlocks_leave_one_relock() {
    let (coordinator, _) = locked_with("pw").await;

    let unlocks = (1..=16).map(|secs| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.unlock_wallet("pw", secs).await })
    });
    for result in futures::future::join_all(unlocks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(1, coordinator.pending_relocks());
    sleep_secs(20.0).await;
    assert_eq!(ModeKind::Locked, coordinator.mode_kind().await);
    assert_eq!(0, coordinator.pending_relocks());
}

const PASSWORDS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Op {
    SetPassword(usize),
    ChangePassword(usize, usize),
    RemovePassword(usize),
    Unlock(usize, i64),
    Lock,
    Balance,
    /// whole seconds plus a few millis, so no wait ends exactly on a relock
    Wait(u64),
}

fn op() -> impl Strategy<Value = Op> {
    let pw = 0..PASSWORDS.len();
    prop_oneof![
        pw.clone().prop_map(Op::SetPassword),
        (pw.clone(), pw.clone()).prop_map(|(a, b)| Op::ChangePassword(a, b)),
        pw.clone().prop_map(Op::RemovePassword),
        (pw, 1i64..8).prop_map(|(p, t)| Op::Unlock(p, t)),
        Just(Op::Lock),
        Just(Op::Balance),
        (0u64..10).prop_map(Op::Wait),
    ]
}

async fn apply(coordinator: &Coordinator, op: &Op) {
    // every outcome is acceptable here; only the relock bookkeeping is checked
    match op {
        Op::SetPassword(p) => drop(coordinator.set_password(PASSWORDS[*p], None).await),
        Op::ChangePassword(old, new) => drop(
            coordinator
                .set_password(PASSWORDS[*old], Some(PASSWORDS[*new]))
                .await,
        ),
        Op::RemovePassword(p) => drop(coordinator.remove_wallet_password(PASSWORDS[*p]).await),
        Op::Unlock(p, secs) => drop(coordinator.unlock_wallet(PASSWORDS[*p], *secs).await),
        Op::Lock => drop(coordinator.lock_wallet().await),
        Op::Balance => drop(coordinator.get_available_balance().await),
        Op::Wait(secs) => {
            tokio::time::sleep(Duration::from_millis(secs * 1_000 + 7)).await;
        }
    }
}

#[proptest(cases = 64)]
fn at_most_one_pending_relock(#[strategy(vec(op(), 1..30))] ops: Vec<Op>) {
    let observations = paused_runtime().block_on(async {
        let (coordinator, _) = unencrypted();
        let mut observations = vec![];
        for op in &ops {
            apply(&coordinator, op).await;
            observations.push((
                op.clone(),
                coordinator.pending_relocks(),
                coordinator.mode_kind().await,
            ));
        }
        observations
    });

    for (op, pending, mode) in observations {
        prop_assert!(pending <= 1, "{} pending relocks after {:?}", pending, op);
        prop_assert_eq!(
            pending == 1,
            mode == ModeKind::UnlockedTimed,
            "after {:?}: mode {} with {} pending",
            op,
            mode,
            pending
        );
    }
}
