//! End-to-end scenario suite for the minute store.
//!
//! Each submodule exercises one slice of the public surface against real
//! files in temp directories: the write path with its gap filling, the
//! query API, and the growth/recovery behaviour around damaged or
//! contended files.

mod helpers;

mod queries;
mod recovery;
mod writes;
