use thiserror::Error;

/// Failure constructing a [`crate::Context`].
///
/// Everything past construction returns a raw `ash::prelude::VkResult` — once the function
/// table and pools exist there is no reason to wrap GPU result codes behind a crate-specific
/// type, since callers already match on `vk::Result::ERROR_OUT_OF_DATE_KHR` and friends.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid handle passed to context_create: {0}")]
    InvalidHandle(&'static str),
    #[error("failed to create context object: {0}")]
    Vulkan(#[from] ash::vk::Result),
}
