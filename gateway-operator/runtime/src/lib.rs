#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use gateway_operator_core as core;
pub use gateway_operator_k8s_api as k8s;
pub use gateway_operator_k8s_sync as sync;

mod args;

pub use self::args::Args;
