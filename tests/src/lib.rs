//! End-to-end tests driving the vote workload against the mock voting service. See `tests/`.
