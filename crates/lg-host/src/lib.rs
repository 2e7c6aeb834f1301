// SPDX-License-Identifier: MIT OR Apache-2.0
//! lg-host
//!
//! Launch a backend server as a detached process, then gate on its
//! readiness with a bounded, fixed-interval poll.
//!
//! ```no_run
//! use lg_host::{LaunchSpec, LaunchStatus, ReadinessProbe, ServerLauncher};
//!
//! # async fn demo() -> Result<(), lg_host::LaunchError> {
//! let spec = LaunchSpec::new("vllm", "logs/vllm.log")
//!     .args(["serve", "Qwen/Qwen2.5-VL-7B-Instruct", "--port", "12000"])
//!     .env("CUDA_VISIBLE_DEVICES", "0");
//! let probe = ReadinessProbe::tcp("127.0.0.1", 12000);
//!
//! let launcher = ServerLauncher::new();
//! let mut handle = launcher.launch(spec)?;
//! match launcher.await_ready(&mut handle, &probe).await {
//!     LaunchStatus::Ready => println!("ready pid={}", handle.pid()),
//!     other => eprintln!("{other}: {:?}", handle.diagnostic()),
//! }
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
mod duration_millis;
pub mod error;
pub mod handle;
pub mod launcher;
pub mod probe;
pub mod spec;
pub mod status;

pub use cancel::CancelToken;
pub use error::LaunchError;
pub use handle::{Diagnostic, LaunchHandle, LaunchReport};
pub use launcher::ServerLauncher;
pub use probe::{
    HttpCheck, Liveness, PollOutcome, ProbeOutcome, ReadinessCheck, ReadinessProbe,
    ReadinessSignal, TcpCheck, poll_readiness,
};
pub use spec::{LaunchSpec, LogMode};
pub use status::{LaunchStatus, StatusError, StatusTracker, StatusTransition};
