//! Tests for the vidshard-router crate.

mod helpers;
