use solo_live::kernel::cancel::CancellationRegistry;

#[test]
fn test_new_attempt_supersedes_previous() {
    let mut registry = CancellationRegistry::new();

    let first = registry.begin();
    assert!(registry.is_current(first.epoch));

    // 1. A second begin cancels the first token and its epoch
    let second = registry.begin();
    assert!(first.token.is_cancelled());
    assert!(!registry.is_current(first.epoch));
    assert!(registry.is_current(second.epoch));
    assert!(!second.token.is_cancelled());
}

#[test]
fn test_cancel_rejects_late_results_and_is_idempotent() {
    let mut registry = CancellationRegistry::new();
    let attempt = registry.begin();

    registry.cancel();
    registry.cancel();

    assert!(attempt.token.is_cancelled());
    assert!(!registry.is_current(attempt.epoch), "late result accepted after cancel");
}
