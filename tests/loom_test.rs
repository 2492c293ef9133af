#![cfg(loom)]

mod common;

#[test]
fn two_thread_loom_test() {
    loom::model(|| {
        common::increment_fields_test::<2, 2>(1, 2);
    });
}
