// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property-set algebra.
//!
//! A [`PropertySet`] marks which of a struct's (at most 32) properties are
//! selected. Bit `n` stands for the property with tag `n`.
//!
//! | Operator | Meaning |
//! |----------|---------|
//! | `a + b`  | union |
//! | `a - b`  | difference |
//! | `a & b`  | intersection |
//! | `a <= b` | `a` is a subset of `b` |
//! | `a < b`  | `a` is a strict subset of `b` |

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, BitAnd, BitAndAssign, Sub, SubAssign};

/// Maximum number of properties a struct can declare.
pub const PROPERTY_CAPACITY: u32 = u32::BITS;

/// Bitmask of struct properties, indexed by property tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertySet(u32);

impl PropertySet {
    /// Empty set.
    pub const NONE: PropertySet = PropertySet(0);

    /// Set containing every possible tag.
    pub const ALL: PropertySet = PropertySet(u32::MAX);

    /// Create from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        PropertySet(bits)
    }

    /// Set containing only `tag`. Tags outside `0..32` yield the empty set.
    #[must_use]
    pub const fn from_tag(tag: u32) -> Self {
        if tag < PROPERTY_CAPACITY {
            PropertySet(1 << tag)
        } else {
            PropertySet::NONE
        }
    }

    /// Set containing every tag yielded by `tags`.
    pub fn from_tags(tags: impl IntoIterator<Item = u32>) -> Self {
        tags.into_iter()
            .fold(PropertySet::NONE, |set, tag| set + PropertySet::from_tag(tag))
    }

    /// Get the raw bits value.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Number of selected properties.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.0.count_ones()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check whether `tag` is part of the set.
    #[must_use]
    pub const fn has(&self, tag: u32) -> bool {
        tag < PROPERTY_CAPACITY && self.0 & (1 << tag) != 0
    }

    /// Check whether every element of `other` is part of the set.
    #[must_use]
    pub const fn contains(&self, other: PropertySet) -> bool {
        (self.0 & other.0) == other.0
    }

    /// `self ⊆ other`
    #[must_use]
    pub const fn is_subset(&self, other: PropertySet) -> bool {
        other.contains(*self)
    }

    /// `self ⊂ other`
    #[must_use]
    pub const fn is_strict_subset(&self, other: PropertySet) -> bool {
        self.is_subset(other) && self.0 != other.0
    }

    /// Lowest tag in the set.
    #[must_use]
    pub const fn first(&self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros())
        }
    }

    /// Highest tag in the set.
    #[must_use]
    pub const fn last(&self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(PROPERTY_CAPACITY - 1 - self.0.leading_zeros())
        }
    }

    /// Iterate over the tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        let bits = self.0;
        (0..PROPERTY_CAPACITY).filter(move |tag| bits & (1 << tag) != 0)
    }

    /// Render all 32 bits, most significant first.
    pub fn to_string_with(&self, zero: char, one: char) -> String {
        (0..PROPERTY_CAPACITY)
            .rev()
            .map(|tag| if self.has(tag) { one } else { zero })
            .collect()
    }

    /// Parse the output of [`to_string_with`](Self::to_string_with).
    ///
    /// Shorter strings are read as the low bits. Returns `None` on foreign
    /// characters or more than 32 of them.
    pub fn from_str_with(s: &str, zero: char, one: char) -> Option<Self> {
        let mut bits = 0u32;
        let mut len = 0;

        for c in s.chars() {
            len += 1;
            if len > PROPERTY_CAPACITY {
                return None;
            }
            bits <<= 1;
            if c == one {
                bits |= 1;
            } else if c != zero {
                return None;
            }
        }

        Some(PropertySet(bits))
    }
}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with('0', '1'))
    }
}

impl PartialOrd for PropertySet {
    /// Subset ordering. Sets where neither contains the other are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.0 == other.0 {
            Some(Ordering::Equal)
        } else if self.is_subset(*other) {
            Some(Ordering::Less)
        } else if other.is_subset(*self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl Add for PropertySet {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        PropertySet(self.0 | rhs.0)
    }
}

impl AddAssign for PropertySet {
    fn add_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Sub for PropertySet {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        PropertySet(self.0 & !rhs.0)
    }
}

impl SubAssign for PropertySet {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 &= !rhs.0;
    }
}

impl BitAnd for PropertySet {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        PropertySet(self.0 & rhs.0)
    }
}

impl BitAndAssign for PropertySet {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}
