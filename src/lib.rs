#![doc = include_str!("../README.md")]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("braid size arithmetic assumes a 64-bit target");

pub mod braid;

#[cfg(feature = "proptest")]
pub mod proptest;

pub use braid::cursor::{CursorMut, IntoIter, Iter};
pub use braid::view::{Reversed, Slice, SliceMut};
pub use braid::Braid;
