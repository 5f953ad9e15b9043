// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn epoch_zero_formats() {
    assert_eq!(format_utc(0), "1970-01-01T00:00:00Z");
}

#[test]
fn known_timestamp_formats() {
    // 2026-01-30T08:14:09Z
    assert_eq!(format_utc(1769760849), "2026-01-30T08:14:09Z");
}

#[test]
fn leap_day_formats() {
    // 2024-02-29T12:00:00Z
    assert_eq!(format_utc(1709208000), "2024-02-29T12:00:00Z");
}

#[parameterized(
    seconds = { 5, "5s" },
    minutes = { 120, "2m" },
    hours = { 3600, "1h" },
    hours_minutes = { 5400, "1h30m" },
    days = { 259200, "3d" },
)]
fn elapsed_formats(secs: u64, expected: &str) {
    assert_eq!(format_elapsed(secs), expected);
}

#[test]
fn now_epoch_ms_is_sane() {
    // Some time after 2020-01-01
    assert!(now_epoch_ms() > 1_577_836_800_000);
}
