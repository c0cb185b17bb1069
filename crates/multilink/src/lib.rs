//! Relocation packer: recovers zero-page and text relocation streams by
//! diffing three builds of the same program assembled at different base
//! addresses, then repacks them onto a single relocatable object.
//!
//! See [`pack::pack`] for the algorithm. The companion `multilink` binary
//! is a thin CLI wrapper: read three files, call [`pack::pack`], write
//! the result.

#![warn(missing_debug_implementations)]

pub mod pack;
