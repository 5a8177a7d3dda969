//! Profiling hooks. With the `tracy` feature they forward to `tracy-client`,
//! otherwise every hook compiles to nothing.

#[cfg(not(feature = "tracy"))]
mod fallback;
#[cfg(feature = "tracy")]
mod tracy;

#[cfg(not(feature = "tracy"))]
pub use fallback::{frame_mark, plot, span, start};
#[cfg(feature = "tracy")]
pub use tracy::{frame_mark, plot, span, start};

pub use tracing::instrument;
