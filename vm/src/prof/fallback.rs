#[macro_export]
macro_rules! plot {
    ($name: expr, $value: expr) => {
        ()
    };
}

#[macro_export]
macro_rules! span {
    ($name: expr) => {
        ()
    };
}

#[inline(always)]
pub fn start() {}

#[inline(always)]
pub fn frame_mark() {}

pub use plot;
pub use span;
