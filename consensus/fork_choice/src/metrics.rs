pub use metrics::*;
use std::sync::LazyLock;
use types::EthSpec;

use crate::{ForkChoice, ForkChoiceStore};

pub static FORK_CHOICE_QUEUED_ATTESTATIONS: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "fork_choice_queued_attestations",
        "Current count of queued attestations",
    )
});
pub static FORK_CHOICE_NODES: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge("fork_choice_nodes", "Current count of proto array nodes")
});
pub static FORK_CHOICE_INDICES: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "fork_choice_indices",
        "Current count of proto array indices",
    )
});
pub static FORK_CHOICE_VOTES: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "fork_choice_votes",
        "Current length of the latest message vote list",
    )
});
pub static FORK_CHOICE_VALIDATED_ATTESTATION_DATAS: LazyLock<Result<IntGauge>> =
    LazyLock::new(|| {
        try_create_int_gauge(
            "fork_choice_validated_attestation_datas",
            "Current count of attestation data roots validated in this epoch",
        )
    });
pub static FORK_CHOICE_BALANCES_LENGTH: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "fork_choice_balances_length",
        "Length of the justified balances used by the last head computation",
    )
});
pub static FORK_CHOICE_DEQUEUED_ATTESTATIONS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "fork_choice_dequeued_attestations_total",
        "Total count of dequeued attestations",
    )
});
pub static FORK_CHOICE_IRRECOVERABLE_ERRORS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "fork_choice_irrecoverable_errors_total",
        "Total count of internal invariant violations raised by fork choice",
    )
});
pub static FORK_CHOICE_BALANCES_CACHE_MISSES: LazyLock<Result<IntCounterVec>> =
    LazyLock::new(|| {
        try_create_int_counter_vec(
            "beacon_fork_choice_balances_cache_miss_total",
            "Count of justified balances requests served by a fallback state, by tier",
            &["tier"],
        )
    });
pub static FORK_CHOICE_ON_BLOCK_TIMES: LazyLock<Result<Histogram>> = LazyLock::new(|| {
    try_create_histogram(
        "beacon_fork_choice_process_block_seconds",
        "The duration in seconds of on_block runs",
    )
});
pub static FORK_CHOICE_ON_ATTESTATION_TIMES: LazyLock<Result<Histogram>> = LazyLock::new(|| {
    try_create_histogram(
        "beacon_fork_choice_process_attestation_seconds",
        "The duration in seconds of on_attestation runs",
    )
});
pub static FORK_CHOICE_ON_ATTESTER_SLASHING_TIMES: LazyLock<Result<Histogram>> =
    LazyLock::new(|| {
        try_create_histogram(
            "beacon_fork_choice_on_attester_slashing_seconds",
            "The duration in seconds on on_attester_slashing runs",
        )
    });
pub static FORK_CHOICE_UPDATE_HEAD_TIMES: LazyLock<Result<Histogram>> = LazyLock::new(|| {
    try_create_histogram(
        "beacon_fork_choice_update_head_seconds",
        "The duration in seconds of update_head runs",
    )
});

/// Update the global metrics `DEFAULT_REGISTRY` with info from the fork choice.
pub fn scrape_for_metrics<T: ForkChoiceStore<E>, E: EthSpec>(fork_choice: &ForkChoice<T, E>) {
    let snapshot = fork_choice.metrics_snapshot();

    set_gauge(
        &FORK_CHOICE_QUEUED_ATTESTATIONS,
        snapshot.queued_attestations as i64,
    );
    set_gauge(&FORK_CHOICE_NODES, snapshot.nodes as i64);
    set_gauge(&FORK_CHOICE_INDICES, snapshot.indices as i64);
    set_gauge(&FORK_CHOICE_VOTES, snapshot.votes as i64);
    set_gauge(
        &FORK_CHOICE_VALIDATED_ATTESTATION_DATAS,
        snapshot.validated_attestation_datas as i64,
    );
    set_gauge(&FORK_CHOICE_BALANCES_LENGTH, snapshot.balances_length as i64);
}
