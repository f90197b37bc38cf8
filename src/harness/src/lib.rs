//! Expectation-driven harness for validation layer conformance tests.
//!
//! A test brings up a `Framework`, declares the diagnostics it expects on
//! the `Monitor`, drives the API through the resource wrappers and
//! builder helpers, and finally verifies. Diagnostics reach the monitor
//! through the debug callback installed by `Framework::init_framework`.
#![allow(
    clippy::missing_safety_doc,
    clippy::new_without_default,
    clippy::too_many_arguments,
    clippy::type_complexity
)]

use ash::vk;
use derive_more::Display;

macro_rules! err_msg {
    ($($arg:tt)+) => {
        crate::Error::from(format!($($arg)+))
    };
}

mod util;
#[macro_use]
mod macros;

mod accel;
mod backend;
mod barrier;
mod buffer;
mod builders;
mod chain;
mod classify;
mod commands;
mod debug;
mod descriptor;
mod device;
mod framework;
mod image;
mod instance;
mod memory;
mod monitor;
mod pipeline;
mod render_pass;
mod sampler;
mod shader;
pub mod sim;
mod sync;

#[cfg(test)]
mod testing;

pub use accel::*;
pub use backend::*;
pub use barrier::*;
pub use buffer::*;
pub use builders::*;
pub use chain::*;
pub use classify::*;
pub use commands::*;
pub use debug::*;
pub use descriptor::*;
pub use device::*;
pub use framework::*;
pub use image::*;
pub use instance::*;
pub use memory::*;
pub use monitor::*;
pub use pipeline::*;
pub use render_pass::*;
pub use sampler::*;
pub use shader::*;
pub use sync::*;
pub use util::*;

#[doc(hidden)]
pub use ash as __ash;
#[doc(hidden)]
pub use unit as __unit;

#[derive(Debug, Display)]
#[display(fmt = "{}", _0)]
struct StringError(String);

impl std::error::Error for StringError {}

/// A precondition the driver, layer or device does not meet. Tests
/// turn these into skips rather than failures.
#[derive(Debug, Display)]
#[display(fmt = "{}", _0)]
struct Unsupported(String);

impl std::error::Error for Unsupported {}

#[derive(Debug, Display)]
#[display(fmt = "{}", _0)]
pub struct Error(anyhow::Error);

impl std::error::Error for Error {}

impl Error {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self(anyhow::Error::new(Unsupported(msg.into())))
    }

    pub fn is_unsupported(&self) -> bool {
        self.0.downcast_ref::<Unsupported>().is_some()
    }

    /// The API result code behind this error, if there is one.
    pub fn vk_result(&self) -> Option<vk::Result> {
        self.0.downcast_ref::<vk::Result>().copied()
    }
}

impl From<vk::Result> for Error {
    fn from(res: vk::Result) -> Self {
        Self(res.into())
    }
}

impl From<ash::LoadingError> for Error {
    fn from(err: ash::LoadingError) -> Self {
        Self(err.into())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Self(anyhow::Error::new(StringError(msg)))
    }
}

impl<'a> From<&'a str> for Error {
    fn from(msg: &'a str) -> Self {
        msg.to_owned().into()
    }
}

impl From<Error> for unit::Abort {
    fn from(err: Error) -> Self {
        if err.is_unsupported() {
            unit::Abort::Skip(err.to_string())
        } else {
            unit::Abort::Fatal(err.to_string())
        }
    }
}

pub type HarnessResult<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_becomes_skip() {
        let abort: unit::Abort = Error::unsupported("no multiViewport").into();
        assert_eq!(abort, unit::Abort::skip("no multiViewport"));

        let err = Error::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        let abort: unit::Abort = err.into();
        assert!(!abort.is_skip());
    }
}
