//! Silicon model for the Vortex CNN accelerator family.
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the silicon: group/lane geometry, capability tables per
//! device variant, the per-layer register file, bitfield definitions, and
//! the APB address map for every on-chip memory kind.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`profile`] | [`profile::DeviceProfile`] — geometry, capability flags, bit widths |
//! | [`regs`] | Layer/global register indices, bitfield definitions, address math |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod profile;
pub mod regs;

pub use profile::{DeviceProfile, DeviceVariant};
