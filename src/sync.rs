cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        pub(crate) use loom::sync::Arc;
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        pub(crate) use shuttle::sync::Arc;
    } else {
        pub(crate) use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        pub(crate) use std::sync::Arc;
    }
}
