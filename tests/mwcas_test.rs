#![cfg(all(not(loom), not(feature = "shuttle")))]

mod common;

use common::increment_fields_test;
use mwcas_bench::MAX_TARGET_NUM;
use test_log::test;

#[test]
fn test_two_threads_incrementing_two_shared_fields() {
    // both fields see every operation's window, so both end at 200_000
    increment_fields_test::<2, 2>(100_000, 2);
}

#[test]
fn test_overlapping_windows_force_helping() {
    // arity-4 windows over 5 fields always overlap, so operations routinely
    // run into each other's in-flight descriptors and must help
    increment_fields_test::<4, 5>(20_000, 4);
}

#[test]
fn test_max_arity_stress() {
    increment_fields_test::<16, 1000>(10_000, MAX_TARGET_NUM);
}

#[test]
fn test_single_thread_full_arity() {
    increment_fields_test::<1, { MAX_TARGET_NUM }>(1_000, MAX_TARGET_NUM);
}
