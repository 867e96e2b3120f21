// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Common Modul for the location broker
//!
//! Provides the common data types that are used across every modul.

pub mod accuracy;
pub mod cell;
pub mod location;
