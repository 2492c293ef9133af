#![cfg(feature = "shuttle")]

mod common;

use shuttle::scheduler::RandomScheduler;
use shuttle::{Config, PortfolioRunner};
use test_log::test;

#[test]
fn two_thread_shuttle_test() {
    let mut portfolio_runner: PortfolioRunner = PortfolioRunner::new(true, Config::new());
    for _ in 0..8 {
        portfolio_runner.add(RandomScheduler::new(10_000usize));
    }
    portfolio_runner.run(|| {
        common::increment_fields_test::<2, 3>(4, 2);
    });
}
