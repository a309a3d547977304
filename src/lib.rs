//! A presentation-surface coordination layer on top of `ash`: automatic swapchain
//! recreation, at-most-once binary-semaphore/fence pooling keyed off a timeline counter, and
//! an acquire / get-current / present protocol across one or more swapchains per frame.
//!
//! This crate never creates or owns the instance, device, or physical device — those are
//! external collaborators the caller constructs and is responsible for tearing down, strictly
//! after every [`Context`] and [`Swapchain`] built against them has been destroyed. It also
//! never touches the windowing toolkit or the render graph: callers record and submit their
//! own command buffers, signaling the semaphores this crate hands back from `acquire`.

pub mod acquire;
mod caps;
mod context;
mod error;
mod function_table;
mod log;
pub mod present;
mod pool;
mod swapchain;

pub use ash::vk;

pub use acquire::acquire;
pub use context::{Context, ContextInfo};
pub use error::InitError;
pub use log::{LogLevel, LogSink};
pub use present::present;
pub use swapchain::{Swapchain, SwapchainImage, SwapchainInfo};
