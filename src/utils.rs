// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for pipcook.
//!
//! This module provides common utility functions used across the codebase.

use rand::Rng;

/// Alphabet for generated ids.
const ID_ALPHABET: &[u8] = b"1234567890abcdefghijklmnopqrstuvwxyz";

/// Length of generated ids.
pub const ID_LENGTH: usize = 8;

/// Generate a random id for scratch file names.
///
/// Eight characters from `[0-9a-z]`.
///
/// # Examples
///
/// ```
/// use pipcook::utils::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 8);
/// assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
/// ```
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
