use donation_payments::domain::donation::{donation_status_for, DonationStatus};
use donation_payments::domain::transaction::{
    allowed_predecessors, classify_transition, TransactionStatus, TransitionOutcome,
};

#[test]
fn pending_resolves_through_webhook_to_completed() {
    // Scenario: synchronous gateway call failed with a 503, transaction
    // stayed pending; the success webhook arrives later.
    let current = TransactionStatus::Pending;
    assert_eq!(
        classify_transition(current, TransactionStatus::Completed),
        TransitionOutcome::Apply
    );
    assert_eq!(donation_status_for(TransactionStatus::Completed), DonationStatus::Completed);
}

#[test]
fn duplicate_completion_webhook_is_a_noop() {
    assert_eq!(
        classify_transition(TransactionStatus::Completed, TransactionStatus::Completed),
        TransitionOutcome::AlreadyApplied
    );
}

#[test]
fn no_sequence_of_events_regresses_a_terminal_state() {
    let terminals = [
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
        TransactionStatus::Refunded,
    ];
    let all = [
        TransactionStatus::Pending,
        TransactionStatus::AwaitingConfirmation,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
        TransactionStatus::Refunded,
    ];

    for current in terminals {
        for target in all {
            let outcome = classify_transition(current, target);
            // The single exception: refund overlays a completed payment.
            let refund = current == TransactionStatus::Completed && target == TransactionStatus::Refunded;
            if refund {
                assert_eq!(outcome, TransitionOutcome::Apply);
            } else if current == target {
                assert_eq!(outcome, TransitionOutcome::AlreadyApplied);
            } else {
                assert_eq!(
                    outcome,
                    TransitionOutcome::Conflict,
                    "{:?} -> {:?} must conflict",
                    current,
                    target
                );
            }
        }
    }
}

#[test]
fn out_of_order_deliveries_respect_predecessor_sets() {
    // "captured" (completed) may arrive before "authorized"
    // (awaiting_confirmation); the late event must not rewind.
    assert_eq!(
        classify_transition(TransactionStatus::Pending, TransactionStatus::Completed),
        TransitionOutcome::Apply
    );
    assert_eq!(
        classify_transition(TransactionStatus::Completed, TransactionStatus::AwaitingConfirmation),
        TransitionOutcome::Conflict
    );
}

#[test]
fn refund_is_one_way() {
    assert_eq!(
        classify_transition(TransactionStatus::Refunded, TransactionStatus::Completed),
        TransitionOutcome::Conflict
    );
}

#[test]
fn predecessor_sets_match_the_classifier() {
    let all = [
        TransactionStatus::Pending,
        TransactionStatus::AwaitingConfirmation,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
        TransactionStatus::Refunded,
    ];
    for target in all {
        for current in all {
            let in_set = allowed_predecessors(target).contains(&current);
            let applies = classify_transition(current, target) == TransitionOutcome::Apply;
            assert_eq!(in_set && current != target, applies);
        }
    }
}

#[test]
fn donation_projection_never_diverges() {
    // Every ledger status maps to exactly one projection value; pending-ish
    // states collapse to pending.
    assert_eq!(donation_status_for(TransactionStatus::Pending), DonationStatus::Pending);
    assert_eq!(
        donation_status_for(TransactionStatus::AwaitingConfirmation),
        DonationStatus::Pending
    );
    assert_eq!(donation_status_for(TransactionStatus::Refunded), DonationStatus::Refunded);
}
