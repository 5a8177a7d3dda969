#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 64);

pub use tracy_client::{frame_mark, plot, span};

/// The client must be running before the first span or plot.
pub fn start() {
    tracy_client::Client::start();
}
