// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Per-module counters, exported as named stats providers.
//!
//! Modules never log or write files from the hot path; they bump
//! counters here and let the embedding read them out of band.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Display;

/// The longest name a single stat may carry, NUL excluded.
pub const STAT_NAME_MAX: usize = 31;

/// A provider of named stats.
///
/// An implementation of this trait acts as a group of named u64
/// counters belonging to one module instance. Rather than
/// implementing this trait manually, the stat-macro should be used.
///
/// # Example
///
/// To declare a new stats provider simply define a struct of named
/// fields with type [`StatU64`] and derive [`StatProvider`].
///
/// ```ignore
/// #[derive(StatProvider)]
/// struct SomeStats {
///     bytes_out: StatU64,
///     bytes_in: StatU64,
/// }
/// ```
///
/// To update the values use the `+=` operator.
///
/// ```ignore
/// some_val.stats.bytes_out += 54;
/// ```
///
/// To register a provider see [`StatNamed`].
pub trait StatProvider {
    const NUM_FIELDS: u32;
    type Snap;

    fn init(&mut self) -> Result<(), Error>;

    fn new() -> Self;

    fn num_fields(&self) -> u32 {
        Self::NUM_FIELDS
    }

    /// Return a snapshot of the stats. This is how you obtain a copy,
    /// as opposed to the traditional clone().
    fn snapshot(&self) -> Self::Snap;
}

/// Initialize and register a [`StatProvider`].
///
/// Call [`StatNamed::new()`] **exactly** once per provider, at module
/// construction. The module/name pair identifies the instance to
/// whatever external consumer reads the counters.
pub struct StatNamed<T: StatProvider> {
    pub vals: Box<T>,
    module: String,
    name: String,
}

impl<T: StatProvider> StatNamed<T> {
    pub fn new(
        module: &str,
        name: &str,
        mut provider: T,
    ) -> Result<StatNamed<T>, Error> {
        provider.init()?;
        Ok(Self {
            vals: Box::new(provider),
            module: module.to_string(),
            name: name.to_string(),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A 64-bit unsigned named stat.
pub struct StatU64 {
    value: u64,
}

impl StatU64 {
    pub fn init(&mut self, name: &str) -> Result<(), Error> {
        if name.len() > STAT_NAME_MAX {
            return Err(Error::NameTooLong(name.to_string()));
        }
        Ok(())
    }

    pub fn new() -> Self {
        Self { value: 0 }
    }

    pub fn set(&mut self, val: u64) {
        self.value = val;
    }

    pub fn val(&self) -> u64 {
        self.value
    }
}

impl Default for StatU64 {
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::AddAssign<u64> for StatU64 {
    fn add_assign(&mut self, other: u64) {
        self.value += other;
    }
}

impl core::ops::SubAssign<u64> for StatU64 {
    fn sub_assign(&mut self, other: u64) {
        self.value -= other;
    }
}

/// A stat error.
#[derive(Clone, Debug)]
pub enum Error {
    NameTooLong(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NameTooLong(name) => {
                write!(f, "stat name too long: {}", name)
            }
        }
    }
}
